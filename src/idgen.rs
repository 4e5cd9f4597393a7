//! Identifier-generation conventions for provisioning.
//!
//! The university id is a naming convention, not a security mechanism: the
//! random two-digit suffix means ids are not fully deterministic and
//! collisions are possible but unchecked.

use rand::distributions::Alphanumeric;
use rand::Rng;

const UNIVERSITY_DOMAIN: &str = "@university.edu";

/// Roll number from the cohort key plus the next numeric sequence for that
/// (year, branch) cohort, e.g. `2024CSE007`.
pub fn roll_no(year: i64, branch: &str, seq: i64) -> String {
    format!("{}{}{:03}", year, branch.to_ascii_uppercase(), seq)
}

/// Reversed lowercase first name + last three digits of the contact number
/// (zero-padded) + a random two-digit suffix + the fixed domain.
pub fn university_id(name: &str, contact_number: &str, rng: &mut impl Rng) -> String {
    let first = name.split_whitespace().next().unwrap_or("user");
    let reversed: String = first.to_lowercase().chars().rev().collect();

    let digits: Vec<char> = contact_number.chars().filter(|c| c.is_ascii_digit()).collect();
    let tail: String = if digits.len() >= 3 {
        digits[digits.len() - 3..].iter().collect()
    } else {
        let mut s: String = digits.iter().collect();
        while s.len() < 3 {
            s.insert(0, '0');
        }
        s
    };

    let suffix: u32 = rng.gen_range(10..100);
    format!("{}{}{}{}", reversed, tail, suffix, UNIVERSITY_DOMAIN)
}

/// Initial credential issued at provisioning when the caller supplies none.
pub fn generate_password(rng: &mut impl Rng) -> String {
    (0..12).map(|_| rng.sample(Alphanumeric) as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn roll_no_pads_sequence() {
        assert_eq!(roll_no(2024, "cse", 7), "2024CSE007");
        assert_eq!(roll_no(2023, "ME", 112), "2023ME112");
    }

    #[test]
    fn university_id_shape() {
        let mut rng = SmallRng::seed_from_u64(42);
        let id = university_id("Alice Johnson", "+91-9876543210", &mut rng);
        assert!(id.starts_with("ecila210"), "got {id}");
        assert!(id.ends_with(UNIVERSITY_DOMAIN));
        // reversed name + 3 digits + 2-digit suffix + domain
        let local = id.trim_end_matches(UNIVERSITY_DOMAIN);
        assert_eq!(local.len(), "ecila".len() + 5);
    }

    #[test]
    fn university_id_pads_short_contact() {
        let mut rng = SmallRng::seed_from_u64(1);
        let id = university_id("Bo", "7", &mut rng);
        assert!(id.starts_with("ob007"), "got {id}");
    }

    #[test]
    fn generated_password_is_alphanumeric() {
        let mut rng = SmallRng::seed_from_u64(9);
        let pw = generate_password(&mut rng);
        assert_eq!(pw.len(), 12);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
