//! Search command handler.

use super::print_json;
use clap::Args;
use qabase_core::config::AppConfig;
use qabase_knowledge::KnowledgeBase;

/// Retrieve answers for a question
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of answers to return (default from config)
    #[arg(short = 'k', long)]
    pub k: Option<usize>,

    /// Candidates fetched before diversity selection (default from config)
    #[arg(long)]
    pub fetch_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let kb = KnowledgeBase::open(config).await?;
        let settings = kb.retriever().settings();
        let k = self.k.unwrap_or(settings.k);
        let fetch_k = self.fetch_k.unwrap_or(settings.fetch_k);

        tracing::info!("Searching with k={}, fetch_k={}", k, fetch_k);
        let hits = kb.retriever().search(&self.query, k, fetch_k).await?;

        if self.json {
            return print_json(&hits);
        }

        if hits.is_empty() {
            println!("No matching answers");
            return Ok(());
        }
        for (rank, hit) in hits.iter().enumerate() {
            println!(
                "{}. [{}] {} (score {:.3})",
                rank + 1,
                hit.metadata.id,
                hit.metadata.question,
                hit.score
            );
            println!("   {}", hit.text);
        }
        Ok(())
    }
}
