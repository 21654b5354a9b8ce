use rand::{distributions::Alphanumeric, rngs::StdRng, Rng, SeedableRng};

use crate::constants::CODE_LENGTH;

/// Generate a public retrieval code.
///
/// Each call seeds its own generator, so concurrent callers never share state.
/// Uniqueness is left to the `files_code_key` constraint.
pub fn generate_code() -> String {
    StdRng::from_entropy().sample_iter(&Alphanumeric).take(CODE_LENGTH).map(char::from).collect()
}
