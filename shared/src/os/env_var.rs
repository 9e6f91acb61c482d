use mockall::{automock, predicate::*};
use std::{env, env::VarError, str::FromStr};

/// This provides a mockable way to query an env var.
#[automock]
pub trait EnvVarQuery {
    fn get_env_var(&self, name: &'static str) -> Result<String, VarError>;
}

pub struct ActualEnvVarQuery;
impl EnvVarQuery for ActualEnvVarQuery {
    /// Gets an environment variable using std::env::var
    ///
    /// Example
    /// ```
    /// use invoker_shared::os::env_var::EnvVarQuery;
    ///
    /// let env_query = invoker_shared::os::env_var::ActualEnvVarQuery{};
    /// assert_eq!(
    ///     std::env::var("HOSTNAME"),
    ///     env_query.get_env_var("HOSTNAME")
    /// );
    /// ```
    fn get_env_var(&self, name: &'static str) -> Result<String, VarError> {
        env::var(name)
    }
}

/// Reads and parses an env var, falling back to `default` when it is unset.
/// A value that is set but cannot be parsed is an error.
pub fn parse_env_var_or<T>(
    query: &dyn EnvVarQuery,
    name: &'static str,
    default: T,
) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match query.get_env_var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value {:?} for {}: {}", value, name, e)),
        Err(VarError::NotPresent) => Ok(default),
        Err(e) => Err(anyhow::anyhow!("unable to read {}: {}", name, e)),
    }
}

#[cfg(test)]
mod env_var_tests {
    use super::*;

    #[test]
    fn test_parse_env_var_or() {
        let mut query = MockEnvVarQuery::new();
        query
            .expect_get_env_var()
            .with(eq("SET_PORT"))
            .returning(|_| Ok("9090".to_string()));
        query
            .expect_get_env_var()
            .with(eq("UNSET_PORT"))
            .returning(|_| Err(VarError::NotPresent));
        query
            .expect_get_env_var()
            .with(eq("BAD_PORT"))
            .returning(|_| Ok("ninety".to_string()));

        assert_eq!(parse_env_var_or::<u16>(&query, "SET_PORT", 8080).unwrap(), 9090);
        assert_eq!(parse_env_var_or::<u16>(&query, "UNSET_PORT", 8080).unwrap(), 8080);
        assert!(parse_env_var_or::<u16>(&query, "BAD_PORT", 8080).is_err());
    }
}
