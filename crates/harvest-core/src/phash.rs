/// Normalizes the perceptual-hash output of the image analyzer.
///
/// The analyzer prints either a `0x`-prefixed hex digest or the literal
/// `null`. A digest of all zeros means the image could not be hashed and is
/// treated the same as `null`.
pub fn parse_perceptual_hash(output: &str) -> Option<String> {
    let digest = output.trim_end_matches(['\r', '\n']).trim();
    if digest.is_empty() || digest == "null" {
        return None;
    }
    let hex = digest.strip_prefix("0x").unwrap_or(digest);
    if hex.chars().all(|c| c == '0') {
        return None;
    }
    Some(digest.to_string())
}
