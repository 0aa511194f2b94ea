use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Independent random streams derived from a single match seed. Each stream is
/// further keyed by a step counter so that, for example, the modifier roll at
/// ply 10 never shares randomness with the one at ply 20.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStream {
    Roster,
    Battle,
    Modifiers,
    AutoDraft,
}

impl SeedStream {
    fn salt(self) -> u64 {
        match self {
            SeedStream::Roster => 0x5249_4f53_5445_5200,
            SeedStream::Battle => 0x4241_5454_4c45_0000,
            SeedStream::Modifiers => 0x4d4f_4446_4945_5200,
            SeedStream::AutoDraft => 0x4155_544f_4452_4654,
        }
    }
}

pub fn rng_for(seed: u64, stream: SeedStream, step: u64) -> ChaCha8Rng {
    let mixed = seed
        ^ stream.salt()
        ^ step.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    ChaCha8Rng::seed_from_u64(mixed)
}
