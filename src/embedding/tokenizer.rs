use std::io;
use std::path::Path;

use tokenizers::{Tokenizer, TruncationParams};

/// Loads `tokenizer.json` from a model directory, truncating inputs to `max_len` tokens.
pub fn load_truncating_tokenizer(model_dir: &Path, max_len: usize) -> io::Result<Tokenizer> {
    let path = if model_dir.is_dir() {
        model_dir.join("tokenizer.json")
    } else {
        model_dir.to_path_buf()
    };

    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("tokenizer not found: {}", path.display()),
        ));
    }

    let mut tokenizer = Tokenizer::from_file(&path).map_err(io::Error::other)?;
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_len,
            ..Default::default()
        }))
        .map_err(|e| io::Error::other(format!("failed to configure truncation: {e}")))?;

    Ok(tokenizer)
}
