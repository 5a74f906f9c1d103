use std::{
    fmt,
    fmt::{Debug, Display},
};

/// A value that must never end up in logs or error messages, such as a payout card number or an API token.
///
/// `Debug` and `Display` both render `****`. Use [`Secret::reveal`] at the single point where the plaintext is
/// genuinely needed, and [`Secret::masked`] when a user-facing hint is required.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default + AsRef<str>> Secret<T> {
    /// Returns `****1234` style hint exposing at most the last four characters. Short values are fully masked.
    pub fn masked(&self) -> String {
        let s = self.value.as_ref();
        let count = s.chars().count();
        if count <= 8 {
            return "****".to_string();
        }
        let tail = s.chars().skip(count - 4).collect::<String>();
        format!("****{tail}")
    }

    pub fn is_empty(&self) -> bool {
        self.value.as_ref().is_empty()
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn never_prints_plaintext() {
        let card = Secret::new("4169738812345678".to_string());
        assert_eq!(format!("{card}"), "****");
        assert_eq!(format!("{card:?}"), "****");
        assert_eq!(card.masked(), "****5678");
        assert_eq!(Secret::new("1234".to_string()).masked(), "****");
    }
}
