//! Variable name normalization.

/// Lowercase `src` and separate words with `_`.
///
/// An uppercase letter starts a new word unless it follows another uppercase
/// letter. Every run of characters that are not ASCII letters or digits
/// collapses into one `_`.
pub fn to_underscored_name(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut name = String::with_capacity(src.len() + 8);
    for (i, &c) in bytes.iter().enumerate() {
        if c.is_ascii_alphabetic() {
            if c.is_ascii_uppercase() {
                if i != 0 && !bytes[i - 1].is_ascii_uppercase() && !name.ends_with('_') {
                    name.push('_');
                }
                name.push(char::from(c.to_ascii_lowercase()));
            } else {
                name.push(char::from(c));
            }
        } else if c.is_ascii_digit() {
            name.push(char::from(c));
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(to_underscored_name("RequestCount"), "request_count");
        assert_eq!(to_underscored_name("requestCount"), "request_count");
        assert_eq!(to_underscored_name("HTTPServer"), "httpserver");
    }

    #[test]
    fn test_punctuation_collapses() {
        assert_eq!(to_underscored_name("rpc.server::latency"), "rpc_server_latency");
        assert_eq!(to_underscored_name("a  b"), "a_b");
        assert_eq!(to_underscored_name("-x"), "_x");
    }

    #[test]
    fn test_already_normalized() {
        assert_eq!(to_underscored_name("io_read_bytes2"), "io_read_bytes2");
        assert_eq!(to_underscored_name("foo_Bar"), "foo_bar");
    }
}
