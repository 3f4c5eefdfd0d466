// src/collab/mod.rs
// Per-conversation collaboration state engine: extracts a structured
// `<collab_state>{...}</collab_state>` trailer when the reply producer
// supplies one, otherwise falls back to a deterministic heuristic over the
// turn's text. Maintains an LRU+TTL in-memory cache backed by durable
// persistence in the conversation store.

use chrono::Utc;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::collections::HashSet;

use crate::config::CollabMode;
use crate::conversation::{CollabPhase, CollaborationState};

const MAX_LIST_ITEMS: usize = 4;
const MAX_KEYWORDS: usize = 48;

lazy_static! {
    static ref COLLAB_BLOCK_RE: Regex =
        Regex::new(r"(?s)<collab_state>\s*(\{.*?\})\s*</collab_state>\s*$").unwrap();
    static ref COLLAB_REGEX: Regex =
        Regex::new(r"(?i)\b(collaborat\w*|partner\w*|work together|joint|team up)\b").unwrap();
    static ref DEPTH_REGEX: Regex =
        Regex::new(r"(?i)\b(in depth|deep dive|dive deeper|technical detail|architecture|design doc)\b").unwrap();
    static ref CLOSE_REGEX: Regex =
        Regex::new(r"(?i)\b(wrap(ping)? up|let'?s conclude|that'?s all|sounds good, thanks|talk soon|follow up later)\b").unwrap();
    static ref THREAD_REGEX: Regex =
        Regex::new(r"(?i)\b((?:working|interested|focused) on [a-z0-9 ,-]{3,40}|goal (?:is|of) [a-z0-9 ,-]{3,40})").unwrap();
    static ref CANDIDATE_REGEX: Regex =
        Regex::new(r"(?i)\b(could (?:collaborate|work together) on [a-z0-9 ,-]{3,40}|joint (?:effort|project) on [a-z0-9 ,-]{3,40})").unwrap();
    static ref QUESTION_REGEX: Regex = Regex::new(r"[^.!?\n]{3,120}\?").unwrap();
}

/// Best-effort validated patch extracted from a structured collab_state
/// trailer. Every field is optional; absent/malformed fields leave the
/// corresponding state field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollabPatch {
    pub phase: Option<String>,
    #[serde(alias = "turnCount")]
    pub turn_count: Option<i64>,
    #[serde(alias = "overlapScore")]
    pub overlap_score: Option<f64>,
    pub confidence: Option<f64>,
    #[serde(alias = "activeThreads")]
    pub active_threads: Option<Vec<String>>,
    #[serde(alias = "candidateCollaborations")]
    pub candidate_collaborations: Option<Vec<String>>,
    #[serde(alias = "openQuestions")]
    pub open_questions: Option<Vec<String>>,
    #[serde(alias = "shouldClose")]
    pub close_signal: Option<bool>,
}

/// Strips a trailing `<collab_state>{...}</collab_state>` block from
/// `text`, returning the cleaned text and the parsed patch if the block was
/// present and well-formed JSON. A present-but-malformed block is treated as
/// "no structured input" (heuristic fallback takes over), not an error.
pub fn extract_collab_block(text: &str) -> (String, Option<CollabPatch>) {
    let Some(caps) = COLLAB_BLOCK_RE.captures(text) else {
        return (text.to_string(), None);
    };
    let whole = caps.get(0).unwrap();
    let json = caps.get(1).unwrap().as_str();

    let cleaned = format!("{}{}", &text[..whole.start()], &text[whole.end()..])
        .trim_end()
        .to_string();
    let patch = serde_json::from_str::<CollabPatch>(json).ok();
    (cleaned, patch)
}

fn sanitise_list(existing: &[String], additions: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();

    for item in existing.iter().cloned().chain(additions) {
        let trimmed = item.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            out.push(trimmed);
        }
        if out.len() >= MAX_LIST_ITEMS {
            break;
        }
    }
    out
}

fn clamp01_two_decimals(v: f64) -> f64 {
    let clamped = v.clamp(0.0, 1.0);
    (clamped * 100.0).round() / 100.0
}

/// Applies a validated patch to `state`, mutating in place, per the rules in
/// the component design: turn never decreases, scores clamp/round, lists
/// sanitise and cap at four items, unknown/invalid fields are skipped.
pub fn apply_patch(state: &mut CollaborationState, patch: &CollabPatch) {
    let patched_phase = patch.phase.as_deref().and_then(CollabPhase::parse);

    let patched_turn = patch.turn_count.map(|n| n.clamp(0, 500)).unwrap_or(0);
    state.turn_count = (state.turn_count + 1).max(patched_turn);

    if let Some(score) = patch.overlap_score {
        state.overlap_score = clamp01_two_decimals(score);
    }
    if let Some(confidence) = patch.confidence {
        state.confidence = clamp01_two_decimals(confidence);
    }
    if let Some(threads) = &patch.active_threads {
        if !threads.is_empty() {
            state.active_threads = sanitise_list(&state.active_threads, threads.iter().cloned());
        }
    }
    if let Some(candidates) = &patch.candidate_collaborations {
        if !candidates.is_empty() {
            state.candidate_collaborations =
                sanitise_list(&state.candidate_collaborations, candidates.iter().cloned());
        }
    }
    if let Some(questions) = &patch.open_questions {
        if !questions.is_empty() {
            state.open_questions = sanitise_list(&state.open_questions, questions.iter().cloned());
        }
    }
    if let Some(close) = patch.close_signal {
        state.close_signal = close;
    }

    // Phase is inferred whenever the patch didn't carry a valid one, same
    // as the heuristic path, per the general phase-inference rule.
    state.phase = patched_phase.unwrap_or_else(|| infer_phase(state));
    state.updated_at = Utc::now();
}

/// Builds the keyword set used by the heuristic scorer: words of at least
/// four characters from the tier's topic/goal vocabulary, lower-cased,
/// capped at 48 terms.
pub fn build_keyword_set(topics: &[String], goals: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for phrase in topics.iter().chain(goals.iter()) {
        for word in phrase.split_whitespace() {
            let w = word.to_lowercase();
            if w.len() >= 4 && seen.insert(w.clone()) {
                out.push(w);
                if out.len() >= MAX_KEYWORDS {
                    return out;
                }
            }
        }
    }
    out
}

fn keyword_overlap_score(combined_lower: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let hits = keywords.iter().filter(|k| combined_lower.contains(k.as_str())).count();
    hits as f64 / (keywords.len().max(8) as f64)
}

fn extract_phrases(re: &Regex, text: &str) -> Vec<String> {
    re.captures_iter(text)
        .map(|c| c.get(0).unwrap().as_str().trim().to_string())
        .take(MAX_LIST_ITEMS)
        .collect()
}

/// Deterministic fallback used when no structured collab_state trailer was
/// present or it failed to parse.
pub fn apply_heuristic(
    state: &mut CollaborationState,
    inbound: &str,
    outbound_cleaned: &str,
    keywords: &[String],
) {
    let combined = format!("{inbound} {outbound_cleaned}");
    let combined_lower = combined.to_lowercase();

    let score = keyword_overlap_score(&combined_lower, keywords);
    let collab_hit = COLLAB_REGEX.is_match(&combined);
    let depth_hit = DEPTH_REGEX.is_match(&combined);
    let close_hit = CLOSE_REGEX.is_match(&combined);
    let questions_present = QUESTION_REGEX.is_match(outbound_cleaned);

    let mut delta = score * 0.45;
    delta += if collab_hit { 0.12 } else { 0.0 };
    delta += if depth_hit { 0.08 } else { 0.0 };
    delta += if questions_present { 0.03 } else { -0.03 };

    state.overlap_score = clamp01_two_decimals(state.overlap_score + delta);

    let threads = extract_phrases(&THREAD_REGEX, &combined);
    let candidates = extract_phrases(&CANDIDATE_REGEX, &combined);
    let questions = extract_phrases(&QUESTION_REGEX, outbound_cleaned);

    state.active_threads = sanitise_list(&state.active_threads, threads);
    state.candidate_collaborations = sanitise_list(&state.candidate_collaborations, candidates);
    state.open_questions = sanitise_list(&state.open_questions, questions);

    state.close_signal = state.close_signal || close_hit;
    state.turn_count += 1;
    state.phase = infer_phase(state);
    state.updated_at = Utc::now();
}

/// Phase inference used when the patch didn't set (or invalidly set) phase.
pub fn infer_phase(state: &CollaborationState) -> CollabPhase {
    if state.turn_count >= 5 && state.close_signal {
        return CollabPhase::Close;
    }
    if state.turn_count >= 5
        && (!state.candidate_collaborations.is_empty() || state.overlap_score >= 0.65)
    {
        return CollabPhase::Synthesize;
    }
    if state.turn_count >= 3 && state.overlap_score >= 0.4 {
        return CollabPhase::DeepDive;
    }
    if state.turn_count >= 1 {
        return CollabPhase::Explore;
    }
    CollabPhase::Handshake
}

struct CachedState {
    state: CollaborationState,
}

/// Owns the hot in-memory map of per-conversation collaboration state. Size-
/// bounded and TTL-evicted; durable state lives in the conversation store.
pub struct CollaborationEngine {
    mode: CollabMode,
    ttl_ms: i64,
    max_sessions: usize,
    cache: RwLock<HashMap<String, CachedState>>,
}

impl CollaborationEngine {
    pub fn new(mode: CollabMode, ttl_ms: i64, max_sessions: usize) -> Self {
        Self {
            mode,
            ttl_ms,
            max_sessions,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached state for a conversation, or `None` if absent
    /// (the caller should fall back to the conversation store, then seed
    /// the cache via [`Self::put`]).
    pub fn get(&self, conversation_id: &str) -> Option<CollaborationState> {
        self.cache
            .read()
            .get(conversation_id)
            .map(|c| c.state.clone())
    }

    pub fn put(&self, conversation_id: &str, state: CollaborationState) {
        self.evict();
        let mut cache = self.cache.write();
        cache.insert(conversation_id.to_string(), CachedState { state });
    }

    /// Runs one turn of the engine: extracts a structured patch if present,
    /// otherwise applies the heuristic; returns the updated state plus the
    /// outbound text with any collab_state trailer stripped.
    pub fn update_turn(
        &self,
        current: CollaborationState,
        inbound: &str,
        raw_outbound: &str,
        keywords: &[String],
    ) -> (CollaborationState, String) {
        let (cleaned_outbound, patch) = extract_collab_block(raw_outbound);
        let mut state = current;

        match patch {
            Some(patch) => apply_patch(&mut state, &patch),
            None => apply_heuristic(&mut state, inbound, &cleaned_outbound, keywords),
        }

        if self.mode == CollabMode::DeepDive && state.phase < CollabPhase::DeepDive {
            state.phase = CollabPhase::DeepDive;
        }

        (state, cleaned_outbound)
    }

    fn evict(&self) {
        let now = Utc::now();
        let mut cache = self.cache.write();

        cache.retain(|_, cached| {
            let age_ms = (now - cached.state.updated_at).num_milliseconds();
            age_ms < self.ttl_ms
        });

        while cache.len() >= self.max_sessions {
            let oldest_key = cache
                .iter()
                .min_by_key(|(_, c)| c.state.updated_at)
                .map(|(k, _)| k.clone());
            match oldest_key {
                Some(key) => {
                    cache.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_structured_block_and_strips_it() {
        let raw = r#"Sounds good to me! <collab_state>{"phase":"explore","overlapScore":0.42,"activeThreads":["a","b"]}</collab_state>"#;
        let (cleaned, patch) = extract_collab_block(raw);
        assert_eq!(cleaned, "Sounds good to me!");
        let patch = patch.unwrap();
        assert_eq!(patch.phase.as_deref(), Some("explore"));
        assert_eq!(patch.overlap_score, Some(0.42));
        assert_eq!(patch.active_threads, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn patch_applies_with_clamping_and_monotonic_turn() {
        let mut state = CollaborationState::default();
        state.turn_count = 2;

        let patch = CollabPatch {
            phase: Some("explore".to_string()),
            turn_count: Some(1),
            overlap_score: Some(1.5),
            ..Default::default()
        };
        apply_patch(&mut state, &patch);

        assert_eq!(state.phase, CollabPhase::Explore);
        assert_eq!(state.turn_count, 3);
        assert_eq!(state.overlap_score, 1.0);
    }

    #[test]
    fn phase_inference_follows_thresholds() {
        let mut state = CollaborationState::default();
        state.turn_count = 5;
        state.close_signal = true;
        assert_eq!(infer_phase(&state), CollabPhase::Close);

        state.close_signal = false;
        state.overlap_score = 0.7;
        assert_eq!(infer_phase(&state), CollabPhase::Synthesize);

        state.turn_count = 3;
        state.overlap_score = 0.5;
        assert_eq!(infer_phase(&state), CollabPhase::DeepDive);

        state.turn_count = 1;
        state.overlap_score = 0.0;
        assert_eq!(infer_phase(&state), CollabPhase::Explore);

        state.turn_count = 0;
        assert_eq!(infer_phase(&state), CollabPhase::Handshake);
    }

    #[test]
    fn cache_evicts_past_ttl() {
        let engine = CollaborationEngine::new(CollabMode::Adaptive, 0, 500);
        let mut state = CollaborationState::default();
        state.updated_at = Utc::now() - chrono::Duration::seconds(10);
        engine.put("conv_1", state);

        assert!(engine.get("conv_1").is_none());
    }
}
