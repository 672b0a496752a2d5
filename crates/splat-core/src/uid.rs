//! Process uid generation.

use rand::Rng;

const SUFFIX_LEN: usize = 5;
const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Random lowercase suffix distinguishing startup attempts of the same app.
pub fn generate_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARS[rng.gen_range(0..SUFFIX_CHARS.len())] as char)
        .collect()
}

/// Build a process uid: `{name}.{environment}.{suffix}`.
pub fn generate_uid(name: &str, environment: &str) -> String {
    format!("{}.{}.{}", name, environment, generate_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_shape() {
        let suffix = generate_suffix();
        assert_eq!(suffix.len(), 5);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_uid_embeds_name_and_environment() {
        let uid = generate_uid("pagemail", "prd");
        assert!(uid.starts_with("pagemail.prd."));
        assert_eq!(uid.len(), "pagemail.prd.".len() + 5);
    }
}
