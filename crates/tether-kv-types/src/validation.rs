//! Key normalization and request validation.

use tether_constants::api::IN_ORDER_KEY_WIDTH;
use tether_constants::api::MAX_KEY_SIZE;
use tether_constants::api::MAX_VALUE_SIZE;

use crate::KeyValueStoreError;
use crate::write::WriteCommand;

/// Normalize a key to its canonical form.
///
/// Adds a leading `/`, collapses repeated slashes and drops a trailing `/`.
/// The root normalizes to `/`.
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 1);
    for segment in key.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Normalize and bound-check a key.
pub fn validate_key(key: &str) -> Result<String, KeyValueStoreError> {
    if key.contains('\0') {
        return Err(KeyValueStoreError::InvalidKey {
            key: key.replace('\0', "\\0"),
            reason: "contains NUL byte".to_string(),
        });
    }
    let normalized = normalize_key(key);
    if normalized.len() > MAX_KEY_SIZE as usize {
        return Err(KeyValueStoreError::InvalidKey {
            key: normalized.chars().take(64).collect(),
            reason: format!("size {} exceeds maximum of {} bytes", normalized.len(), MAX_KEY_SIZE),
        });
    }
    Ok(normalized)
}

/// Validate a write command against the fixed size limits.
pub fn validate_write_command(command: &WriteCommand) -> Result<(), KeyValueStoreError> {
    validate_key(command.key())?;
    if let Some(value) = command.value()
        && value.len() > MAX_VALUE_SIZE as usize
    {
        return Err(KeyValueStoreError::ValueTooLarge {
            size: value.len() as u32,
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// Name of an in-order child created at `index`.
///
/// Zero-padded so that lexical order matches creation order.
pub fn in_order_key_name(index: u64) -> String {
    format!("{:0width$}", index, width = IN_ORDER_KEY_WIDTH)
}

/// Join a directory and a child name into a normalized key.
pub fn join_key(dir: &str, name: &str) -> String {
    normalize_key(&format!("{}/{}", dir, name))
}

/// Parent of a normalized key, `None` for the root.
pub fn parent_key(key: &str) -> Option<String> {
    if key == "/" {
        return None;
    }
    match key.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(pos) => Some(key[..pos].to_string()),
        None => Some("/".to_string()),
    }
}

/// Last segment of a normalized key.
pub fn key_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
