//! Encoding and decoding of HTTP Basic credentials.
use base64::{engine::general_purpose::STANDARD, Engine};

const BASIC_SCHEME: &str = "Basic ";

pub fn basic_auth_header(username: &str, password: &str) -> String {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    format!("{BASIC_SCHEME}{encoded}")
}

/// Splits an `Authorization` header value into its username and password.
/// The password may itself contain ':', only the first one separates.
pub fn decode_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix(BASIC_SCHEME)?;
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("b", "b", "Basic Yjpi")]
    #[case("admin", ".", "Basic YWRtaW46Lg==")]
    #[case("ab", "", "Basic YWI6")]
    fn basic_auth_header_encodes_username_and_password(
        #[case] username: &str,
        #[case] password: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(basic_auth_header(username, password), expected);
    }

    #[test]
    fn decode_basic_auth_splits_on_first_colon() {
        let header = basic_auth_header("alice", "pass:word");

        let decoded = decode_basic_auth(&header);

        assert_eq!(
            decoded,
            Some(("alice".to_string(), "pass:word".to_string()))
        );
    }

    #[rstest]
    #[case("Bearer YWI6")]
    #[case("Basic !!!")]
    #[case("Basic YWI=")]
    fn decode_basic_auth_rejects_malformed_header(#[case] header: &str) {
        assert_eq!(decode_basic_auth(header), None);
    }
}
