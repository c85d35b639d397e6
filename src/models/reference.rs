use chrono::Utc;
use rand::Rng;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Admin-created cash transaction
    Admin,
    Conversion,
    CryptoSend,
    InternalTransfer,
    ExternalTransfer,
    Wire,
}

impl ReferenceKind {
    fn prefix(&self) -> &'static str {
        match self {
            ReferenceKind::Admin => "ADM",
            ReferenceKind::Conversion => "CONV",
            ReferenceKind::CryptoSend => "CSND",
            ReferenceKind::InternalTransfer => "TRF",
            ReferenceKind::ExternalTransfer => "EXT",
            ReferenceKind::Wire => "WIR",
        }
    }
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Human-readable reference such as `ADM-1718035200000-K3F9QZ` or
/// `CONV-35200000-7QXA`. Uniqueness is enforced by the database.
pub fn generate(kind: ReferenceKind) -> String {
    let millis = Utc::now().timestamp_millis();
    match kind {
        ReferenceKind::Admin => format!("{}-{}-{}", kind.prefix(), millis, random_suffix(6)),
        _ => format!(
            "{}-{:08}-{}",
            kind.prefix(),
            millis % 100_000_000,
            random_suffix(4)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(reference: &str) -> Vec<&str> {
        reference.split('-').collect()
    }

    #[test]
    fn admin_reference_carries_full_timestamp() {
        let reference = generate(ReferenceKind::Admin);
        let parts = parts(&reference);
        assert_eq!(parts[0], "ADM");
        assert!(parts[1].len() >= 13);
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn short_references_use_last_eight_digits() {
        for (kind, prefix) in [
            (ReferenceKind::Conversion, "CONV"),
            (ReferenceKind::CryptoSend, "CSND"),
            (ReferenceKind::InternalTransfer, "TRF"),
            (ReferenceKind::ExternalTransfer, "EXT"),
            (ReferenceKind::Wire, "WIR"),
        ] {
            let reference = generate(kind);
            let parts = parts(&reference);
            assert_eq!(parts[0], prefix);
            assert_eq!(parts[1].len(), 8);
            assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
            assert_eq!(parts[2].len(), 4);
        }
    }

    #[test]
    fn suffix_is_uppercase_base36() {
        let reference = generate(ReferenceKind::Admin);
        assert!(reference
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase() || c == '-'));
    }
}
