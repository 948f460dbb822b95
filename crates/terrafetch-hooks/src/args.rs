use std::collections::BTreeMap;

use crate::error::HookError;

/// String options for constructing a hook, as parsed from a
/// `name:key=val:key=val` spec or a recipe's args table.
#[derive(Clone, Debug, Default)]
pub struct HookArgs {
    values: BTreeMap<String, String>,
}

impl HookArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Split a `name:key=val:key=val` spec into the hook name and its args.
    pub fn parse_spec(spec: &str) -> Result<(String, HookArgs), HookError> {
        let mut parts = spec.split(':');
        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| HookError::InvalidSpec(spec.to_string()))?;

        let mut args = HookArgs::new();
        for part in parts {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| HookError::InvalidSpec(spec.to_string()))?;
            args.insert(key, value);
        }
        Ok((name.to_string(), args))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_bool(&self, hook: &str, key: &str, default: bool) -> Result<bool, HookError> {
        match self.values.get(key).map(String::as_str) {
            None => Ok(default),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Ok(true),
                "false" | "f" | "no" | "n" | "0" => Ok(false),
                _ => Err(HookError::InvalidOption {
                    hook: hook.to_string(),
                    key: key.to_string(),
                    reason: format!("expected a boolean, got `{raw}`"),
                }),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_key_value_pairs() {
        let (name, args) = HookArgs::parse_spec("unzip:remove=true:overwrite=false").unwrap();
        assert_eq!(name, "unzip");
        assert_eq!(args.get("remove"), Some("true"));
        assert!(args.get_bool("unzip", "remove", false).unwrap());
        assert!(!args.get_bool("unzip", "overwrite", true).unwrap());
    }

    #[test]
    fn bare_name_has_no_args() {
        let (name, args) = HookArgs::parse_spec("checksum").unwrap();
        assert_eq!(name, "checksum");
        assert!(args.is_empty());
    }

    #[test]
    fn malformed_pairs_are_rejected() {
        assert!(HookArgs::parse_spec("unzip:remove").is_err());
        assert!(HookArgs::parse_spec("").is_err());
    }

    #[test]
    fn bad_bool_is_an_invalid_option() {
        let (_, args) = HookArgs::parse_spec("unzip:remove=maybe").unwrap();
        assert!(args.get_bool("unzip", "remove", false).is_err());
    }
}
