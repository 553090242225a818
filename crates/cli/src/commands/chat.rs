//! Chat command handler.
//!
//! Interactive multi-turn session over one conversation history.

use super::build_pipeline;
use clap::Args;
use docrag_core::config::AppConfig;
use docrag_core::{AppError, AppResult};
use docrag_retrieval::session::ANSWER_HISTORY_TURNS;
use std::io::{BufRead, Write};

/// Interactive multi-turn session
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Split compound questions into sub-queries before retrieval
    #[arg(long)]
    pub decompose: bool,

    /// Add paraphrase variations of each query before retrieval
    #[arg(long)]
    pub fan_out: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let mut config = config.clone();
        if self.decompose {
            config.retrieval.use_decomposition = true;
        }
        if self.fan_out {
            config.retrieval.use_fan_out = true;
        }

        let mut pipeline = build_pipeline(&config)?;

        println!("docrag chat - index '{}'", config.elasticsearch.index);
        println!("Type a question, /clear to reset history, /quit to exit.\n");

        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();

        loop {
            print!("> ");
            stdout.flush().map_err(AppError::Io)?;

            let mut line = String::new();
            let read = stdin.lock().read_line(&mut line).map_err(AppError::Io)?;
            if read == 0 {
                // EOF
                break;
            }

            let input = line.trim();
            match input {
                "" => continue,
                "/quit" | "/exit" => break,
                "/clear" => {
                    pipeline.session.clear_history();
                    println!("History cleared.\n");
                    continue;
                }
                _ => {}
            }

            match self.answer_turn(&mut pipeline, input).await {
                Ok(answer) => println!("{}\n", answer),
                Err(AppError::InvalidInput(msg)) => println!("{}\n", msg),
                Err(e) => return Err(e),
            }
        }

        println!("Bye.");
        Ok(())
    }

    /// One question/answer exchange, recorded into the session history.
    async fn answer_turn(
        &self,
        pipeline: &mut super::Pipeline,
        question: &str,
    ) -> AppResult<String> {
        let outcome = pipeline.session.retrieve(question).await?;

        let history = pipeline.session.recent_history(ANSWER_HISTORY_TURNS).to_vec();
        let answer = pipeline
            .generator
            .generate(question, &outcome.results, &history)
            .await?;

        pipeline.session.record_turn(question, answer.clone());
        Ok(answer)
    }
}
