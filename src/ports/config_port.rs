//! Configuration access port trait.

/// Typed lookups into a sectioned key/value configuration.
///
/// Integer and boolean getters fall back to `default` when the key is
/// missing or unparseable; validation of ranges lives in
/// [`crate::domain::config_validation`].
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}
