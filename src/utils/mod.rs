//! Numeric coercion, path and duration helpers

use std::fs::{self, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// 2^32, the modulus for unsigned 32-bit wraparound.
const U32_MODULUS: f64 = 4_294_967_296.0;

/// Coerce a flag value to an unsigned 32-bit integer.
///
/// Follows numeric-string coercion followed by unsigned truncation: surrounding
/// whitespace is ignored, `0x`/`0o`/`0b` prefixes are honoured, fractions are
/// truncated, negative values wrap around and anything non-numeric becomes 0.
pub fn to_uint32(value: &str) -> u32 {
    let number = parse_number(value.trim());

    if !number.is_finite() {
        return 0;
    }

    number.trunc().rem_euclid(U32_MODULUS) as u32
}

fn parse_number(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let radix = match text.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };

    if let Some(radix) = radix {
        let digits = &text[2..];
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return f64::NAN;
        }
        return u128::from_str_radix(digits, radix)
            .map(|n| n as f64)
            .unwrap_or(f64::INFINITY);
    }

    // f64::from_str also accepts "inf" and "nan", which are not numbers here.
    let numeric = text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));

    if !numeric {
        return f64::NAN;
    }

    text.parse::<f64>().unwrap_or(f64::NAN)
}

/// Stat a path, following symlinks.
///
/// "Not found" is an answer (`None`), not an error. Any other stat failure propagates.
pub fn stat(path: &Path) -> io::Result<Option<Metadata>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check whether a path exists.
pub fn exists(path: &Path) -> io::Result<bool> {
    Ok(stat(path)?.is_some())
}

/// Resolve `path` against `base` and remove `.` and `..` components.
///
/// Purely lexical: symlinks are left untouched.
pub fn absolutize(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    let joined = base.join(path);
    let mut result = PathBuf::new();

    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }

    result
}

/// Path of `to` relative to `from`, if one exists
pub fn relative_path(from: &Path, to: &Path) -> Option<String> {
    pathdiff::diff_paths(to, from)
        .map(|p| p.display().to_string())
}

/// Display a path relative to `base` when it lives below it.
pub fn display_path(base: &Path, path: &Path) -> String {
    match relative_path(base, path) {
        Some(rel) if !rel.starts_with("..") && !rel.is_empty() => rel,
        _ => path.display().to_string(),
    }
}

/// Duration as shown in reports (`12ms`, `1.50s`, `1m 5.00s`)
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = secs - (mins as f64 * 60.0);
        format!("{}m {:.2}s", mins, remaining_secs)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}
