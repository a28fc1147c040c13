use crate::aggregate::BaselineCluster;
use crate::parser::Level;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z][a-zA-Z0-9_]+").unwrap());

/// Union of baseline clusters whose sample messages are textually similar.
#[derive(Debug, Clone, Serialize)]
pub struct MergedCluster {
    pub merged_fingerprint: String,
    pub count: u64,
    pub member_fingerprints: Vec<String>,
    pub sample_message: String,
    pub level: Level,
    pub service: String,
}

fn tokenize(text: &str) -> Vec<String> {
    RE_TOKEN
        .find_iter(text)
        .map(|token| token.as_str().to_lowercase())
        .collect()
}

fn build_tfidf_vectors(texts: &[&str]) -> Vec<HashMap<String, f64>> {
    let tokenized: Vec<Vec<String>> = texts.iter().map(|text| tokenize(text)).collect();
    let total_docs = tokenized.len();
    if total_docs == 0 {
        return Vec::new();
    }

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for tokens in &tokenized {
        for token in tokens.iter().unique() {
            *doc_freq.entry(token.as_str()).or_insert(0) += 1;
        }
    }

    tokenized
        .iter()
        .map(|tokens| {
            if tokens.is_empty() {
                return HashMap::new();
            }
            let token_count = tokens.len() as f64;
            let mut tf: HashMap<&str, f64> = HashMap::new();
            for token in tokens {
                *tf.entry(token.as_str()).or_insert(0.0) += 1.0 / token_count;
            }
            tf.into_iter()
                .map(|(token, tf_value)| {
                    // Smoothed idf: never zero, negative, or divided by zero.
                    let df = doc_freq[token] as f64;
                    let idf = ((total_docs as f64 + 1.0) / (df + 1.0)).ln() + 1.0;
                    (token.to_string(), tf_value * idf)
                })
                .collect()
        })
        .collect()
}

fn cosine_similarity(left: &HashMap<String, f64>, right: &HashMap<String, f64>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let (small, large) = if left.len() > right.len() {
        (right, left)
    } else {
        (left, right)
    };

    let dot: f64 = small
        .iter()
        .map(|(token, value)| value * large.get(token).copied().unwrap_or(0.0))
        .sum();
    let left_norm = left.values().map(|v| v * v).sum::<f64>().sqrt();
    let right_norm = right.values().map(|v| v * v).sum::<f64>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

/// Array-backed disjoint set, local to one merge invocation.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent[root_b] = root_a;
        }
    }
}

/// Merges clusters whose sample messages have TF-IDF cosine similarity at or
/// above the threshold. Components are connected, not all-pairs-similar: two
/// members of one group may be linked only through an intermediate cluster.
pub fn merge_clusters_tfidf(
    clusters: &[BaselineCluster],
    similarity_threshold: f64,
) -> Vec<MergedCluster> {
    if clusters.is_empty() {
        return Vec::new();
    }

    let texts: Vec<&str> = clusters
        .iter()
        .map(|cluster| cluster.sample_message.as_str())
        .collect();
    let vectors = build_tfidf_vectors(&texts);

    let mut sets = DisjointSet::new(clusters.len());
    for (i, j) in (0..clusters.len()).tuple_combinations() {
        if cosine_similarity(&vectors[i], &vectors[j]) >= similarity_threshold {
            sets.union(i, j);
        }
    }

    let mut grouped: HashMap<usize, Vec<&BaselineCluster>> = HashMap::new();
    for (index, cluster) in clusters.iter().enumerate() {
        grouped.entry(sets.find(index)).or_default().push(cluster);
    }

    let mut merged: Vec<MergedCluster> = grouped
        .into_values()
        .map(|mut members| {
            members.sort_by(|a, b| {
                b.count
                    .cmp(&a.count)
                    .then_with(|| a.fingerprint.cmp(&b.fingerprint))
            });
            let top = members[0];
            let count = members.iter().map(|member| member.count).sum();
            let member_fingerprints = members
                .iter()
                .map(|member| member.fingerprint.clone())
                .sorted()
                .collect();
            MergedCluster {
                merged_fingerprint: top.fingerprint.clone(),
                count,
                member_fingerprints,
                sample_message: top.sample_message.clone(),
                level: top.level,
                service: top.service.clone(),
            }
        })
        .collect();

    merged.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.merged_fingerprint.cmp(&b.merged_fingerprint))
    });
    merged
}
