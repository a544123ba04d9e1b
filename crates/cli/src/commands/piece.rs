//! `filvyn put` / `filvyn get`: Raw access to the piece store.

use filvyn_core::Cid;
use filvyn_store::ContentStore;
use std::io::Write;
use std::path::PathBuf;

use super::{load_config, piece_client, CliResult};

pub async fn put(file: PathBuf) -> CliResult {
    let config = load_config()?;
    let client = piece_client(&config)?;

    let bytes = tokio::fs::read(&file)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    tracing::info!(file = %file.display(), size = bytes.len(), "Uploading piece");

    let cid = client.put(&bytes).await?;
    println!("{cid}");
    Ok(())
}

pub async fn get(cid: String, output: Option<PathBuf>) -> CliResult {
    let config = load_config()?;
    let client = piece_client(&config)?;

    let cid = Cid::new(cid);
    let bytes = client
        .get(&cid)
        .await?
        .ok_or_else(|| format!("Piece not found: {cid}"))?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, &bytes).await?;
            eprintln!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
