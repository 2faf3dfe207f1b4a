use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

/// Persists an unexpected fault with its full cause chain and returns the
/// file path so it can be shown to the user.
pub fn write_error_to_log_file(err: &anyhow::Error) -> Result<PathBuf> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before unix epoch")?;
    let path = std::env::temp_dir().join(format!(
        "updraft-{}-{}.log",
        std::process::id(),
        now.as_nanos()
    ));

    let mut content = format!(
        "[{}] updraft {}\n{}\n",
        now.as_secs(),
        env!("CARGO_PKG_VERSION"),
        err
    );
    for cause in err.chain().skip(1) {
        content.push_str(&format!("  caused by: {cause}\n"));
    }
    content.push_str(&format!("\n{err:?}\n"));

    fs::write(&path, content)
        .with_context(|| format!("failed writing diagnostic log: {}", path.display()))?;
    Ok(path)
}
