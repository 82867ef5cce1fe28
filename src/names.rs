use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::types::{DestName, UploadSource};

/// Check that `name` complies with the restricted DNS naming conventions
/// required for virtual-hosting style bucket access.
///
/// With `strict` the name must be all lowercase; otherwise the looser rules
/// shared by every driver apply (leading/trailing alphanumeric, interior
/// alphanumeric plus `.`, `-`, `_`, `:`).
pub fn validate_container_name(name: &str, strict: bool) -> StorageResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StorageError::invalid_name("Container name cannot be empty."));
    }

    let length = name.chars().count();
    if length < 3 {
        return Err(StorageError::invalid_name(
            "Container name cannot be less than 3 characters.",
        ));
    }
    if length > 63 {
        return Err(StorageError::invalid_name(
            "Container name cannot be greater than 63 characters.",
        ));
    }

    if looks_like_ip_address(name) {
        return Err(StorageError::invalid_name(
            "Container name cannot be an ip address",
        ));
    }

    for forbidden in ["..", ".-", "-."] {
        if name.contains(forbidden) {
            return Err(StorageError::invalid_name(format!(
                "Container name contains invalid successive chars {forbidden:?}.",
            )));
        }
    }

    if strict && !matches_bucket_chars(name, true) {
        return Err(StorageError::invalid_name(
            "Container name contains invalid characters (strictly enforced).",
        ));
    }

    if !matches_bucket_chars(name, false) {
        return Err(StorageError::invalid_name(format!(
            "Container name does not follow S3 standards. Container: {name}",
        )));
    }

    Ok(())
}

/// `^(\d+\.){3}\d+$`
fn looks_like_ip_address(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Strict: `^[a-z0-9][a-z0-9.\-]{1,61}[a-z0-9]$`
/// Loose:  `^[A-Za-z0-9][A-Za-z0-9.\-_:]{1,61}[A-Za-z0-9]$`
fn matches_bucket_chars(name: &str, strict: bool) -> bool {
    let chars: Vec<char> = name.chars().collect();
    let edge_ok = |c: char| {
        if strict {
            c.is_ascii_lowercase() || c.is_ascii_digit()
        } else {
            c.is_ascii_alphanumeric()
        }
    };
    let interior_ok = |c: char| {
        if strict {
            c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'
        } else {
            c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':')
        }
    };

    edge_ok(chars[0])
        && edge_ok(chars[chars.len() - 1])
        && chars[1..chars.len() - 1].iter().all(|&c| interior_ok(c))
}

/// Normalize an object name before storage: drop backslashes, collapse
/// repeated slashes, strip one leading/trailing slash, replace characters
/// outside `[A-Za-z0-9/.\-_]` with `_`, and collapse repeated underscores.
///
/// Idempotent: `sanitize_object_name(sanitize_object_name(s)) ==
/// sanitize_object_name(s)` for every input.
pub fn sanitize_object_name(name: &str) -> String {
    // Backslashes never survive; a backslash-slash pair drops as a unit.
    let mut cleaned = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if chars.peek() == Some(&'/') {
                chars.next();
            }
            continue;
        }
        cleaned.push(c);
    }

    let mut collapsed = String::with_capacity(cleaned.len());
    let mut previous_slash = false;
    for c in cleaned.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        collapsed.push(c);
    }

    let mut trimmed: &str = &collapsed;
    trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

    let mut result = String::with_capacity(trimmed.len());
    let mut previous_underscore = false;
    for c in trimmed.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if c == '_' {
            if previous_underscore {
                continue;
            }
            previous_underscore = true;
        } else {
            previous_underscore = false;
        }
        result.push(c);
    }

    result
}

/// Generate a random unique object name, preserving the extension and any
/// directory prefix of `filename`.
pub fn random_filename(filename: Option<&str>) -> String {
    let (folder, base) = match filename {
        Some(f) if !f.is_empty() => match f.rfind('/') {
            Some(idx) => (&f[..idx], &f[idx + 1..]),
            None => ("", f),
        },
        _ => ("", ""),
    };

    // splitext semantics: a leading dot is a hidden file, not an extension
    let ext = base
        .rfind('.')
        .filter(|&idx| idx > 0)
        .map(|idx| &base[idx..])
        .unwrap_or("");

    let token = Uuid::new_v4().simple().to_string();
    if folder.is_empty() {
        format!("{token}{ext}")
    } else {
        format!("{folder}/{token}{ext}")
    }
}

/// Resolve the destination naming policy against the upload source.
///
/// `UseKey` is only meaningful inside a bulk upload, where the orchestrator
/// substitutes the item's mapping key before calling this.
pub fn resolve_dest_name(dest: &DestName, source: &UploadSource) -> StorageResult<String> {
    match dest {
        DestName::Auto => source.suggested_name().ok_or_else(|| {
            StorageError::storage("Cannot derive a destination name from the upload source")
        }),
        DestName::Random => Ok(random_filename(source.suggested_name().as_deref())),
        DestName::UseKey => Err(StorageError::storage(
            "usekey naming is only valid for bulk uploads",
        )),
        DestName::Name(name) => Ok(name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_boundaries() {
        assert!(validate_container_name("ab", false).is_err());
        assert!(validate_container_name("abc", false).is_ok());
        assert!(validate_container_name(&"a".repeat(63), false).is_ok());
        assert!(validate_container_name(&"a".repeat(64), false).is_err());
        assert!(validate_container_name("", false).is_err());
    }

    #[test]
    fn test_container_name_ip_shaped() {
        assert!(validate_container_name("192.168.1.1", false).is_err());
        assert!(validate_container_name("10.0.0.1", true).is_err());
        // Not quite an IP: fewer than four groups
        assert!(validate_container_name("192.168.1", false).is_ok());
    }

    #[test]
    fn test_container_name_successive_chars() {
        assert!(validate_container_name("abc..def", false).is_err());
        assert!(validate_container_name("abc.-def", false).is_err());
        assert!(validate_container_name("abc-.def", false).is_err());
        assert!(validate_container_name("abcCDE.-_:abc", false).is_err());
    }

    #[test]
    fn test_container_name_charset() {
        assert!(validate_container_name("abci123-gre", false).is_ok());
        assert!(validate_container_name("/abc", false).is_err());
        assert!(validate_container_name("abc/", false).is_err());
        assert!(validate_container_name("abc jdhgd", true).is_err());
        assert!(validate_container_name("abci123-gr.e", true).is_ok());
        // Uppercase passes loose but not strict validation
        assert!(validate_container_name("aBc123", false).is_ok());
        assert!(validate_container_name("aBc123", true).is_err());
    }

    #[test]
    fn test_sanitize_object_name() {
        assert_eq!(sanitize_object_name("Test123"), "Test123");
        assert_eq!(sanitize_object_name("Test_123"), "Test_123");
        assert_eq!(sanitize_object_name("/abc123"), "abc123");
        assert_eq!(sanitize_object_name("abc123/"), "abc123");
        assert_eq!(sanitize_object_name("/abc123/defjhss/"), "abc123/defjhss");
        assert_eq!(sanitize_object_name("/abc\\/123/defjhss/"), "abc123/defjhss");
        assert_eq!(sanitize_object_name("/abc\\123/defjhss/"), "abc123/defjhss");
        assert_eq!(sanitize_object_name("/abc\\123//defjhss/"), "abc123/defjhss");
        assert_eq!(
            sanitize_object_name("/abc\\123//defjhss/def.jpg"),
            "abc123/defjhss/def.jpg"
        );
        assert_eq!(
            sanitize_object_name("/abc\\123//def$#%@&#*$@:\"jhss/def.jpg"),
            "abc123/def_jhss/def.jpg"
        );
        assert_eq!(
            sanitize_object_name("123476365785686548568456486485645646548648658454.jpg"),
            "123476365785686548568456486485645646548648658454.jpg"
        );
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let samples = [
            "",
            "/abc123/defjhss/",
            "//abc",
            "/abc\\123//def$#%@&#*$@:\"jhss/def.jpg",
            "a__b///c\\d",
            "plain/key/with.ext",
        ];
        for sample in samples {
            let once = sanitize_object_name(sample);
            assert_eq!(sanitize_object_name(&once), once, "input: {sample:?}");
        }
    }

    #[test]
    fn test_random_filename() {
        assert!(!random_filename(None).is_empty());
        assert!(!random_filename(Some("")).is_empty());
        assert!(random_filename(Some("abc.jpg")).ends_with(".jpg"));
        assert_ne!(random_filename(Some("abc.jpg")), "abc.jpg");
        assert!(random_filename(Some("abc/abc.jpg")).ends_with(".jpg"));
        assert!(random_filename(Some("abc/abc.jpg")).starts_with("abc/"));
        assert!(random_filename(Some("abc/abc")).starts_with("abc/"));
        assert!(!random_filename(Some("abc/abc")).ends_with("abc"));
        // 128-bit tokens do not collide in practice
        assert_ne!(random_filename(Some("a.png")), random_filename(Some("a.png")));
    }

    #[test]
    fn test_resolve_dest_name() {
        let source = UploadSource::named_bytes("photos/abc.jpg", "x");
        assert_eq!(
            resolve_dest_name(&DestName::Auto, &source).unwrap(),
            "abc.jpg"
        );
        let random = resolve_dest_name(&DestName::Random, &source).unwrap();
        assert!(random.ends_with(".jpg"));
        assert_ne!(random, "abc.jpg");
        assert_eq!(
            resolve_dest_name(&DestName::Name("fixed.bin".into()), &source).unwrap(),
            "fixed.bin"
        );
        assert!(resolve_dest_name(&DestName::UseKey, &source).is_err());

        let anonymous = UploadSource::bytes("x");
        assert!(resolve_dest_name(&DestName::Auto, &anonymous).is_err());
        // Random works without a suggested name; there is just no extension
        assert!(!resolve_dest_name(&DestName::Random, &anonymous)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_dest_name_from_str() {
        assert_eq!(DestName::from("auto"), DestName::Auto);
        assert_eq!(DestName::from("random"), DestName::Random);
        assert_eq!(DestName::from("usekey"), DestName::UseKey);
        assert_eq!(
            DestName::from("custom.bin"),
            DestName::Name("custom.bin".into())
        );
    }
}
