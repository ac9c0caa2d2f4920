use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::json;
use std::sync::Arc;

use trellis_rs::llm::openai::OpenAiProvider;
use trellis_rs::llm::{Fallback, GenerationRequest, Message, ResilientCaller};
use trellis_rs::trellis::config::RuntimeConfig;
use trellis_rs::trellis::workflow::agents::research_workflow;
use trellis_rs::trellis::workflow::{partial, RunStatus};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a single prompt through the resilient caller
    Ask {
        /// The prompt to send
        #[arg(short, long)]
        prompt: String,

        /// Model override (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,

        /// Path to a YAML config file
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Run the research workflow for a query
    Run {
        /// The question to research
        #[arg(short, long)]
        query: String,

        /// Path to a YAML config file
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Ask {
            prompt,
            model,
            config,
        } => {
            let config = RuntimeConfig::load(config.as_deref())?;
            let model = model.unwrap_or_else(|| config.model.clone());
            let provider = Arc::new(OpenAiProvider::new(model)?);
            let caller = ResilientCaller::new(provider, config.call_policy());

            let request = GenerationRequest::new(vec![Message::user(prompt)])
                .with_temperature(config.temperature);
            let fallback: Fallback<String> = Box::new(|err| {
                format!("Sorry, the model is unavailable right now ({}).", err)
            });

            let outcome = caller.call_text(request, Some(fallback)).await?;
            if outcome.degraded {
                log::warn!("returning degraded fallback response");
            }
            println!("{}", outcome.value);
        }
        Commands::Run { query, config } => {
            let config = RuntimeConfig::load(config.as_deref())?;
            let provider = Arc::new(OpenAiProvider::new(config.model.clone())?);
            let caller = Arc::new(ResilientCaller::new(provider, config.call_policy()));

            let engine = research_workflow(caller, &config)?;

            match engine.run(partial([("user_query", json!(query))])).await {
                Ok(report) => match report.status {
                    RunStatus::Completed => {
                        match report.state.get_str("final_answer") {
                            Some(answer) => println!("{}", answer),
                            None => println!(
                                "No answer was approved. Last feedback: {}",
                                report.state.get_str("validation_feedback").unwrap_or("none")
                            ),
                        }
                        log::info!("workflow completed in {} steps", report.steps);
                    }
                    RunStatus::StepLimit => {
                        eprintln!(
                            "Step budget of {} exhausted after {} steps; partial state follows.",
                            engine.step_budget(),
                            report.steps
                        );
                        eprintln!(
                            "{}",
                            serde_json::to_string_pretty(&report.state.to_json())?
                        );
                    }
                },
                Err(failure) => {
                    eprintln!(
                        "Workflow failed: {}\nLast state:\n{}",
                        failure.error,
                        serde_json::to_string_pretty(&failure.state.to_json())?
                    );
                    return Err(failure.into());
                }
            }
        }
    }

    Ok(())
}
