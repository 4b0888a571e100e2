use std::collections::BTreeMap;
use std::{env, fs};

use anyhow::{anyhow, Result};

use crate::config::providers::GenericSourceValue;

pub fn prepare_generic_source_value(value: &GenericSourceValue) -> Result<String> {
    match value {
        GenericSourceValue::Literal { value } => Ok(value.to_owned()),
        GenericSourceValue::FromEnv { from_env } => {
            env::var(from_env).map_err(|err| anyhow!("env '{}': {}", from_env, err))
        }
        GenericSourceValue::FromFile { path } => fs::read_to_string(path)
            .map_err(|err| anyhow!("file '{}': {}", path, err))
            .map(|res| res.trim().to_string()),
    }
}

pub fn prepare_generic_source_values<'a, I>(values: I) -> Result<BTreeMap<String, String>>
where
    I: IntoIterator<Item = (&'a String, &'a GenericSourceValue)>,
{
    values
        .into_iter()
        .map(|(key, value)| {
            prepare_generic_source_value(value)
                .map(|resolved| (key.to_owned(), resolved))
                .map_err(|err| anyhow!("value '{}': {}", key, err))
        })
        .collect()
}
