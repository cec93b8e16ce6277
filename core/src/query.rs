use crate::index::{build_index, InvertedIndex, SearchableRecord, UserId};
use crate::tokenizer::tokenize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

/// Added once per query token when the user is posted under that exact token.
pub const EXACT_MATCH_WEIGHT: u32 = 2;
/// Added once per (query token, index key) pair where the key contains the
/// token and the user is posted under the key. The exact key counts too.
pub const PARTIAL_MATCH_WEIGHT: u32 = 1;

/// Users posted under at least one query token (OR semantics).
///
/// Only exact tokens discover candidates; substring matches affect ranking
/// alone.
pub fn search(query: &str, index: &InvertedIndex) -> BTreeSet<UserId> {
    let mut hits = BTreeSet::new();
    for token in tokenize(query) {
        hits.extend(index.postings(&token).iter().copied());
    }
    hits
}

/// Order `candidates` by relevance to `query`, highest first.
pub fn rank<I>(candidates: I, query: &str, index: &InvertedIndex) -> Vec<UserId>
where
    I: IntoIterator<Item = UserId>,
{
    rank_scored(candidates, query, index).into_iter().map(|(id, _)| id).collect()
}

/// Like [`rank`] but keeps each candidate's score.
///
/// The output is a permutation of the input: nothing is filtered or added.
/// Equal scores are ordered by ascending id.
pub fn rank_scored<I>(candidates: I, query: &str, index: &InvertedIndex) -> Vec<(UserId, u32)>
where
    I: IntoIterator<Item = UserId>,
{
    let candidates: Vec<UserId> = candidates.into_iter().collect();
    if candidates.is_empty() {
        return Vec::new();
    }
    let mut scores: HashMap<UserId, u32> = candidates.iter().map(|&id| (id, 0)).collect();

    let mut credit = |postings: &[UserId], weight: u32| {
        let distinct: HashSet<UserId> = postings.iter().copied().collect();
        for id in distinct {
            if let Some(score) = scores.get_mut(&id) {
                *score += weight;
            }
        }
    };

    for token in tokenize(query) {
        credit(index.postings(&token), EXACT_MATCH_WEIGHT);
        // keys are lowercase by construction: tokenizer output, role literal or year
        for (key, postings) in index.iter() {
            if key.contains(token.as_str()) {
                credit(postings, PARTIAL_MATCH_WEIGHT);
            }
        }
    }

    let mut ranked: Vec<(UserId, u32)> = candidates
        .into_iter()
        .map(|id| (id, scores.get(&id).copied().unwrap_or(0)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

/// Full request pipeline over a directory snapshot: build, search, rank.
pub fn search_directory(query: &str, records: &[SearchableRecord]) -> Vec<(UserId, u32)> {
    let start = Instant::now();
    let index = build_index(records);
    let candidates = search(query, &index);
    let num_candidates = candidates.len();
    let ranked = rank_scored(candidates, query, &index);
    tracing::debug!(
        users = records.len(),
        vocabulary = index.len(),
        candidates = num_candidates,
        took_us = start.elapsed().as_micros() as u64,
        "search pipeline"
    );
    ranked
}
