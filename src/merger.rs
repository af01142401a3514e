// 🔗 Merger - Greedy single-pass merge of buckets with similar names
//
// Buckets are compared in order. Bucket i absorbs every later bucket whose
// representative scores >= threshold against i's representative. Absorbed
// buckets are consumed and never compared again, so the merge is not
// transitive: A~B and B~C does not pull C into A unless A~C.

use crate::grouping_key::Bucket;
use crate::similarity::Similarity;
use tracing::debug;

/// Member names used to build a representative
const REPRESENTATIVE_NAMES: usize = 3;

/// First (up to 3) member names, space-joined
pub fn representative_text(bucket: &Bucket) -> String {
    bucket
        .members
        .iter()
        .take(REPRESENTATIVE_NAMES)
        .map(|entity| entity.name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn merge_similar_buckets<S>(buckets: Vec<Bucket>, threshold: f64, similarity: &S) -> Vec<Bucket>
where
    S: Similarity + ?Sized,
{
    // Representatives come from the buckets as partitioned, before any merge
    let representatives: Vec<String> = buckets.iter().map(representative_text).collect();
    let mut slots: Vec<Option<Bucket>> = buckets.into_iter().map(Some).collect();
    let mut merged = Vec::with_capacity(slots.len());

    for i in 0..slots.len() {
        let Some(mut current) = slots[i].take() else {
            continue;
        };

        for j in (i + 1)..slots.len() {
            if slots[j].is_none() {
                continue;
            }

            let score = similarity.score(&representatives[i], &representatives[j]);
            if score >= threshold {
                if let Some(absorbed) = slots[j].take() {
                    debug!(
                        into = %current.key,
                        from = %absorbed.key,
                        score,
                        "buckets merged"
                    );
                    current.members.extend(absorbed.members);
                }
            }
        }

        merged.push(current);
    }

    merged
}
