use crate::{Result, TarantoolError, Value};

/// SQL parameter container.
#[derive(Clone, Debug, PartialEq)]
pub enum Params {
    /// Positional values mapped to `?` placeholders.
    Positional(Vec<Value>),
    /// Named values mapped to `:name` style placeholders.
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Builds positional parameters.
    pub fn positional(values: impl Into<Vec<Value>>) -> Self {
        Self::Positional(values.into())
    }

    /// Builds named parameters.
    ///
    /// Names can be provided with or without prefix (`:`, `@`, `$`).
    pub fn named<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Positional(values) => values.is_empty(),
            Self::Named(values) => values.is_empty(),
        }
    }

    /// Builds the SQL bind array a transport sends with an execute request.
    ///
    /// Positional values are sent as is; each named value becomes a
    /// single-entry map keyed by its prefixed name.
    pub fn to_bind(&self) -> Result<Value> {
        match self {
            Self::Positional(values) => Ok(Value::Array(values.clone())),
            Self::Named(values) => values
                .iter()
                .map(|(name, value)| {
                    let name = normalize_named_parameter_name(name)?;
                    Ok(Value::Map(vec![(Value::Text(name), value.clone())]))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        Self::Positional(values.into())
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(values: Vec<(String, Value)>) -> Self {
        Self::Named(values)
    }
}

fn normalize_named_parameter_name(name: &str) -> Result<String> {
    let bare = name.trim_start_matches([':', '@', '$']);
    if bare.is_empty() {
        return Err(TarantoolError::InvalidParameter(
            "named parameter name cannot be empty".to_owned(),
        ));
    }
    if bare.len() == name.len() {
        Ok(format!(":{bare}"))
    } else {
        Ok(name.to_owned())
    }
}
