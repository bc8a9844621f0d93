use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::domain::{BulletEntry, CandidateProfile, JobPosting};

/// Immutable ground truth a generated unit is checked against.
///
/// Built once per job from the candidate's verified facts; the target
/// posting's own company, title, and skill terms are folded in as well,
/// since naming the job being applied to is grounded in the posting rather
/// than fabricated about the candidate.
#[derive(Debug, Clone, Default)]
pub struct FactBase {
    entries: usize,
    tokens: HashSet<String>,
}

impl FactBase {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_profile(profile: &CandidateProfile, bullets: &[BulletEntry]) -> Self {
        let mut base = Self::default();
        base.push(&profile.name);
        for skill in &profile.skills {
            base.push(skill);
        }
        for experience in &profile.experience {
            base.push(&experience.company);
            base.push(&experience.title);
            for bullet in &experience.bullets {
                base.push(bullet);
            }
        }
        for entry in bullets {
            base.push(&entry.source_company);
            base.push(&entry.text);
        }
        base
    }

    /// Extend the base with terms grounded in the posting itself.
    pub fn with_posting(mut self, job: &JobPosting) -> Self {
        self.push(&job.company);
        self.push(&job.title);
        self.push(&job.location);
        for skill in &job.skills_required {
            self.push(skill);
        }
        self
    }

    pub fn push(&mut self, statement: &str) {
        let mut added = false;
        for token in tokenize(statement) {
            added = true;
            self.tokens.insert(token.normalized);
        }
        if added {
            self.entries += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn contains(&self, normalized: &str) -> bool {
        self.tokens.contains(normalized)
    }
}

/// Verification result for one generated unit. Only a perfect score is
/// accepted; any flagged claim rejects the unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingReport {
    pub score: u8,
    pub flagged_claims: Vec<String>,
}

impl GroundingReport {
    pub fn accepted(&self) -> bool {
        self.score == 100
    }
}

/// Check generated text against the fact base.
///
/// Checkable claims are numeric metrics ("50%", "3x", "2021") and
/// proper-noun entity mentions; each is substantiated iff its normalized
/// token appears in the fact base. The score is the substantiated fraction
/// scaled to 0..=100. Deterministic for a fixed (text, facts) pair, and
/// empty text trivially passes.
pub fn verify(text: &str, facts: &FactBase) -> GroundingReport {
    let claims = extract_claims(text);
    if claims.is_empty() {
        return GroundingReport {
            score: 100,
            flagged_claims: Vec::new(),
        };
    }

    let mut flagged = Vec::new();
    for claim in &claims {
        if !facts.contains(&claim.normalized) {
            flagged.push(claim.surface.clone());
        }
    }

    let substantiated = claims.len() - flagged.len();
    let score = (substantiated * 100 / claims.len()) as u8;
    GroundingReport {
        score,
        flagged_claims: flagged,
    }
}

struct Token {
    surface: String,
    normalized: String,
    sentence_start: bool,
}

struct Claim {
    surface: String,
    normalized: String,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut sentence_start = true;
    for raw in text.split_whitespace() {
        let surface = raw.trim_matches(|c: char| {
            c.is_ascii_punctuation() && !matches!(c, '%' | '+' | '-' | '/')
        });
        let ends_sentence = raw.ends_with(['.', '!', '?', ':']);
        if surface.is_empty() {
            sentence_start = sentence_start || ends_sentence;
            continue;
        }
        tokens.push(Token {
            surface: surface.to_string(),
            normalized: surface.to_lowercase(),
            sentence_start,
        });
        sentence_start = ends_sentence;
    }
    tokens
}

/// Specific, checkable claims: anything numeric, plus capitalized words
/// that are not merely sentence-initial (named entities, product names,
/// skill mentions written as proper nouns).
fn extract_claims(text: &str) -> Vec<Claim> {
    let mut claims = Vec::new();
    for token in tokenize(text) {
        let numeric = token.surface.chars().any(|c| c.is_ascii_digit());
        let entity = !token.sentence_start
            && token.surface.len() > 2
            && token.surface.chars().next().is_some_and(char::is_uppercase);
        if numeric || entity {
            claims.push(Claim {
                surface: token.surface,
                normalized: token.normalized,
            });
        }
    }
    claims
}
