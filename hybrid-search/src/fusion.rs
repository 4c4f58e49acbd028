use std::collections::HashMap;

/// Reciprocal Rank Fusion over two 1-based rankings keyed by chunk id.
/// Ids absent from a list contribute 0 for that list.
pub fn reciprocal_rank_fusion(
    lexical_ranked_ids: &[String],
    dense_ranked_ids: &[String],
    semantic_weight: f64,
    rrf_k: f64,
) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();

    for (idx, id) in lexical_ranked_ids.iter().enumerate() {
        let r_lex = (idx + 1) as f64;
        *scores.entry(id.clone()).or_insert(0.0) += (1.0 - semantic_weight) * (1.0 / (rrf_k + r_lex));
    }
    for (idx, id) in dense_ranked_ids.iter().enumerate() {
        let r_dense = (idx + 1) as f64;
        *scores.entry(id.clone()).or_insert(0.0) += semantic_weight * (1.0 / (rrf_k + r_dense));
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_present_in_both_lists_sums_both_contributions() {
        let lex = vec!["a".to_string(), "b".to_string()];
        let dense = vec!["b".to_string(), "a".to_string()];
        let scores = reciprocal_rank_fusion(&lex, &dense, 0.5, 60.0);
        let expected_a = 0.5 * (1.0 / 61.0) + 0.5 * (1.0 / 62.0);
        let expected_b = 0.5 * (1.0 / 62.0) + 0.5 * (1.0 / 61.0);
        assert!((scores["a"] - expected_a).abs() < 1e-12);
        assert!((scores["b"] - expected_b).abs() < 1e-12);
    }

    #[test]
    fn chunk_missing_from_one_list_contributes_zero_for_it() {
        let lex = vec!["a".to_string()];
        let dense: Vec<String> = vec![];
        let scores = reciprocal_rank_fusion(&lex, &dense, 0.5, 60.0);
        assert!((scores["a"] - 0.5 * (1.0 / 61.0)).abs() < 1e-12);
    }

    #[test]
    fn semantic_weight_zero_ignores_dense_ranking_entirely() {
        let lex = vec!["a".to_string()];
        let dense = vec!["b".to_string()];
        let scores = reciprocal_rank_fusion(&lex, &dense, 0.0, 60.0);
        assert!((scores["a"] - (1.0 / 61.0)).abs() < 1e-12);
        assert_eq!(scores["b"], 0.0);
    }
}
