//! # Utility Functions Module
//!
//! Helper minimi per ridurre il boilerplate nella costruzione degli argomenti
//! dei comandi esterni.

/// Converts an iterable of string-like items into `Vec<String>`, avoiding
/// repeated `.to_string()` calls at every external-tool invocation site.
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Argument-list builder over [`to_string_vec`].
///
/// ```ignore
/// let quality = 85;
/// let args = args!["-quality", quality, "-optimize"];
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$($item.to_string()),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_string_vec() {
        let result = to_string_vec(["hello", "world"]);
        assert_eq!(result, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn test_args_macro_mixed_types() {
        let quality = 85;
        let result = args!["-quality", quality, "-optimize"];
        assert_eq!(
            result,
            vec![
                "-quality".to_string(),
                "85".to_string(),
                "-optimize".to_string()
            ]
        );
    }
}
