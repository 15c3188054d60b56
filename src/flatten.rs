use std::path::PathBuf;

use anyhow::Context as _;

use crate::cli::FlattenArgs;
use crate::formats::{FlatRow, PageResult};

/// One row per interaction, pages first in input order and then
/// interactions in page order. Empty pages contribute nothing.
pub fn flatten(pages: &[PageResult]) -> Vec<FlatRow> {
    pages
        .iter()
        .flat_map(|page| {
            page.interactions().iter().map(move |interaction| FlatRow {
                website_url: page.url.clone(),
                username: interaction.username.clone(),
                bio: interaction.bio.clone(),
                post_type: interaction.post_type.clone(),
                timestamp: interaction.timestamp.clone(),
                upvotes: interaction.upvotes,
                links: interaction.links.clone(),
            })
        })
        .collect()
}

pub fn run(args: FlattenArgs) -> anyhow::Result<()> {
    let pages_path = PathBuf::from(&args.pages);
    let out_path = PathBuf::from(&args.out);
    if out_path.exists() {
        anyhow::bail!("rows output already exists: {}", out_path.display());
    }

    let pages: Vec<PageResult> =
        crate::formats::read_jsonl(&pages_path).context("read pages")?;
    let rows = flatten(&pages);
    tracing::info!(pages = pages.len(), rows = rows.len(), "flatten");

    crate::formats::write_jsonl(&out_path, &rows).context("write rows")?;
    println!("Wrote {} row(s) to {}.", rows.len(), out_path.display());
    Ok(())
}
