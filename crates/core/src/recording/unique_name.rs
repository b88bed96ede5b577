use std::path::{Path, PathBuf};

use rand::Rng;

use crate::shared::constants::NAME_SUFFIX_LEN;

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Builds `{dir}/{base}_{suffix}.{extension}` with a random alphabetic suffix.
///
/// Pure apart from the injected randomness, so a seeded RNG yields a
/// reproducible path. Nothing is created on disk.
pub fn generate_unique_name<R: Rng + ?Sized>(
    dir: &Path,
    base: &str,
    extension: &str,
    rng: &mut R,
) -> PathBuf {
    let suffix = random_suffix(rng, NAME_SUFFIX_LEN);
    dir.join(format!("{base}_{suffix}.{extension}"))
}

fn random_suffix<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}
