use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// `name` under the per-user `speaking-practice` config directory.
pub fn config_file(name: &str) -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("speaking-practice").join(name)
}

pub fn default_device_id_path() -> PathBuf {
    config_file("device_id")
}

/// Returns the persisted device identifier, generating one on first use.
pub fn load_or_create(path: &Path) -> io::Result<String> {
    if let Ok(contents) = fs::read_to_string(path) {
        let existing = contents.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }

    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "device id path has no parent directory",
        )
    })?;
    fs::create_dir_all(parent)?;

    let device_id = Uuid::new_v4().to_string().to_uppercase();
    fs::write(path, &device_id)?;
    Ok(device_id)
}
