use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A time-boxed completion code held on a booking. Write-only from the
/// passenger-facing read model; scrubbed before a booking is returned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Otp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl Otp {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

pub fn generate(ttl: Duration) -> Otp {
    let code: u32 = rand::thread_rng().gen_range(100_000..1_000_000);

    Otp {
        code: code.to_string(),
        expires_at: Utc::now() + ttl,
    }
}

/// Accepts the candidate only if it equals the stored code and the code has
/// not expired. Returns a single boolean: mismatch and expiry are not
/// distinguishable to the caller.
pub fn validate(candidate: &str, stored: &Otp, now: DateTime<Utc>) -> bool {
    let mut diff = u8::from(candidate.len() != stored.code.len());

    for (a, b) in candidate.bytes().zip(stored.code.bytes()) {
        diff |= a ^ b;
    }

    diff == 0 && !stored.is_expired(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_is_six_digits() {
        let otp = generate(Duration::minutes(10));

        assert_eq!(otp.code.len(), 6);
        assert!(otp.code.chars().all(|c| c.is_ascii_digit()));
        assert!(!otp.is_expired(Utc::now()));
    }

    #[test]
    fn validation_accepts_matching_unexpired_code() {
        let otp = generate(Duration::minutes(10));

        assert!(validate(&otp.code, &otp, Utc::now()));
    }

    #[test]
    fn validation_rejects_mismatch_and_expiry_identically() {
        let otp = Otp {
            code: "123456".into(),
            expires_at: Utc::now() + Duration::minutes(10),
        };

        assert!(!validate("654321", &otp, Utc::now()));
        assert!(!validate("12345", &otp, Utc::now()));
        assert!(!validate("123456", &otp, otp.expires_at + Duration::seconds(1)));
    }
}
