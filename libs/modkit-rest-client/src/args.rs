//! Positional call arguments.

use serde::Serialize;
use serde_json::Value;

use crate::error::ConfigError;

/// Arguments of one call, in the order the endpoint declares its bindings.
///
/// Every argument is serialized to a [`serde_json::Value`] when it is added.
/// A serialization failure is kept and reported when the call is made, so the
/// builder chain stays infallible.
///
/// ```ignore
/// let args = CallArgs::new().arg(&42).arg(&NewUser { name: "Ann" });
/// ```
#[derive(Debug, Default)]
pub struct CallArgs {
    values: Vec<Value>,
    error: Option<ConfigError>,
}

impl CallArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        if self.error.is_some() {
            return self;
        }
        match serde_json::to_value(value) {
            Ok(value) => self.values.push(value),
            Err(source) => {
                self.error = Some(ConfigError::ArgumentEncode {
                    index: self.values.len(),
                    source,
                });
            }
        }
        self
    }

    /// Adds a header-map argument.
    #[must_use]
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = headers
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect::<serde_json::Map<_, _>>();
        self.values.push(Value::Object(map));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The encoded values, or the first encoding failure.
    pub(crate) fn into_values(self) -> Result<Vec<Value>, ConfigError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.values),
        }
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(values: Vec<Value>) -> Self {
        Self {
            values,
            error: None,
        }
    }
}
