//! `${NAME}` placeholder substitution over a parsed document.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use super::ConfigError;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern is valid"));

/// Maximum nesting of the document (and of variable expansion chains).
pub(crate) const MAX_DEPTH: usize = 64;

/// Walks a document and replaces every `${NAME}` inside string scalars.
///
/// Values returned by the lookup are expanded again, so `A=${B}` works; a variable
/// whose expansion reaches itself is reported as a circular reference.
pub(crate) struct EnvSubstitutor<'a> {
    lookup: &'a (dyn Fn(&str) -> Option<String> + Send + Sync),
}

impl<'a> EnvSubstitutor<'a> {
    pub fn new(lookup: &'a (dyn Fn(&str) -> Option<String> + Send + Sync)) -> Self {
        Self { lookup }
    }

    pub fn substitute(&self, document: &mut Value) -> Result<(), ConfigError> {
        self.walk(document, "$", 0)
    }

    fn walk(&self, value: &mut Value, path: &str, depth: usize) -> Result<(), ConfigError> {
        if depth > MAX_DEPTH {
            return Err(ConfigError::invalid(
                path,
                format!("document nesting exceeds {} levels", MAX_DEPTH),
            ));
        }

        match value {
            Value::String(s) => {
                if s.contains("${") {
                    let mut stack = Vec::new();
                    *s = self.expand(s, path, &mut stack)?;
                }
            }
            Value::Sequence(items) => {
                for (idx, item) in items.iter_mut().enumerate() {
                    self.walk(item, &format!("{}[{}]", path, idx), depth + 1)?;
                }
            }
            Value::Mapping(map) => {
                for (key, item) in map.iter_mut() {
                    let key = key.as_str().unwrap_or("?");
                    self.walk(item, &format!("{}.{}", path, key), depth + 1)?;
                }
            }
            Value::Tagged(tagged) => self.walk(&mut tagged.value, path, depth + 1)?,
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
        Ok(())
    }

    fn expand(&self, raw: &str, path: &str, stack: &mut Vec<String>) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(raw.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(raw) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&raw[last..whole.start()]);

            let name = name.as_str().trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyPlaceholder {
                    path: path.to_string(),
                });
            }
            if stack.iter().any(|seen| seen == name) || stack.len() >= MAX_DEPTH {
                let mut chain = stack.clone();
                chain.push(name.to_string());
                return Err(ConfigError::CircularReference {
                    chain: chain.join(" -> "),
                });
            }

            let resolved = (self.lookup)(name).ok_or_else(|| {
                ConfigError::UnresolvedVariable {
                    name: name.to_string(),
                    path: path.to_string(),
                    hint: None,
                }
                .with_hint(format!("export {}=<value> before starting the engine", name))
            })?;

            stack.push(name.to_string());
            let expanded = self.expand(&resolved, path, stack)?;
            stack.pop();

            out.push_str(&expanded);
            last = whole.end();
        }

        out.push_str(&raw[last..]);
        Ok(out)
    }
}
