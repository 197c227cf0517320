//! Converts content files between the binary and text encodings.

use crate::commands::write_output;
use crate::config::LodestoneConfig;
use clap::Args;
use eyre::{Context, Result};
use lodestone_content::Codec;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Args)]
pub struct ContentArgs {
    /// Encoded content file
    pub input: PathBuf,
    /// Encoding to produce: `binary` or `text`
    #[arg(long, default_value = "text")]
    pub to: Codec,
    /// Encoding of the input; detected from its header when omitted
    #[arg(long)]
    pub from: Option<Codec>,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn content_command(args: ContentArgs, _config: &LodestoneConfig) -> Result<()> {
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let from = args.from.unwrap_or_else(|| Codec::detect(&bytes));
    debug!("converting {} from {from} to {}", args.input.display(), args.to);

    let graph = from
        .serializer()
        .decode_graph(&bytes)
        .with_context(|| format!("Failed to decode {} as {from}", args.input.display()))?;
    let encoded = args.to.serializer().encode(&graph)?;
    write_output(args.output.as_deref(), &encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_content::{ContentGraph, ContentObject, ContentValue};

    #[tokio::test]
    async fn converts_binary_to_text_and_back() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut graph = ContentGraph::new();
        let node = graph.add_object(ContentObject::new("Material").with_field("name", "Stone"));
        graph.set_root(ContentValue::Object(node));

        let binary = dir.path().join("stone.bin");
        std::fs::write(&binary, Codec::Binary.serializer().encode(&graph)?)?;

        let text = dir.path().join("stone.json");
        content_command(
            ContentArgs {
                input: binary.clone(),
                to: Codec::Text,
                from: None,
                output: Some(text.clone()),
            },
            &LodestoneConfig::default(),
        )
        .await?;
        let decoded = Codec::Text.serializer().decode_graph(&std::fs::read(&text)?)?;
        assert_eq!(decoded, graph);

        let again = dir.path().join("stone.again.bin");
        content_command(
            ContentArgs {
                input: text,
                to: Codec::Binary,
                from: Some(Codec::Text),
                output: Some(again.clone()),
            },
            &LodestoneConfig::default(),
        )
        .await?;
        assert_eq!(Codec::detect(&std::fs::read(&again)?), Codec::Binary);
        Ok(())
    }
}
