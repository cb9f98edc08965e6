use serde::{Deserialize, Serialize};

/// `numerator / denominator`, compared with integer arithmetic only so every
/// node reaches the same verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: u32,
    pub denominator: u32,
}

impl Ratio {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }

    fn scaled(&self, n: usize) -> (u64, u64) {
        (n as u64 * self.denominator as u64, self.numerator as u64)
    }
}

/// Thresholds of a round.
///
/// * `vote`: a candidate stays in the active set when
///   `votes >= vote * voters` (two-thirds by default), counting only the
///   voters whose bitset was computed over the same mapper.
/// * `respondents`: a phase goes through when at least
///   `respondents * expected` participants exchanged a packet (two-fifths
///   by default, so a round survives 60% of its peers falling silent), and
///   never with fewer than `min_respondents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumPolicy {
    pub vote: Ratio,
    pub respondents: Ratio,
    pub min_respondents: usize,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self {
            vote: Ratio::new(2, 3),
            respondents: Ratio::new(2, 5),
            min_respondents: 1,
        }
    }
}

impl QuorumPolicy {
    /// Whether `votes` affirmative bits out of `voters` retain a candidate.
    pub fn retains(&self, votes: usize, voters: usize) -> bool {
        if voters == 0 || self.vote.denominator == 0 {
            return false;
        }
        let (lhs, num) = self.vote.scaled(votes);
        lhs >= voters as u64 * num
    }

    /// Smallest respondent count that carries a phase with `expected`
    /// participants.
    pub fn required_respondents(&self, expected: usize) -> usize {
        let denominator = self.respondents.denominator.max(1) as u64;
        let required = (expected as u64 * self.respondents.numerator as u64).div_ceil(denominator);
        (required as usize).max(self.min_respondents)
    }

    pub fn has_quorum(&self, respondents: usize, expected: usize) -> bool {
        respondents >= self.required_respondents(expected)
    }
}
