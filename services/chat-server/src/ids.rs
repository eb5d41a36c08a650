//! Tagged printable ids: one type-tag byte, a UTC timestamp, and a short
//! random tail. The tag byte doubles as the routing discriminator.

use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;

const TAIL_LEN: usize = 5;

pub fn message_id() -> String {
    tagged('M')
}

pub fn session_id() -> String {
    tagged('S')
}

pub fn apply_id() -> String {
    tagged('A')
}

fn tagged(tag: char) -> String {
    let now = Utc::now().format("%y%m%d%H%M%S");
    let tail: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(TAIL_LEN)
        .map(char::from)
        .collect();
    format!("{tag}{now}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_type_tag() {
        assert!(message_id().starts_with('M'));
        assert!(session_id().starts_with('S'));
        assert!(apply_id().starts_with('A'));
    }

    #[test]
    fn ids_are_fixed_length_and_printable() {
        let id = message_id();
        assert_eq!(id.len(), 1 + 12 + TAIL_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
