use chunk_model::{Chunk, ChunkKind};

const STANDARD_PROTOCOLS: &[&str] =
    &["Comparable", "Equatable", "Hashable", "Codable", "Sendable", "CustomStringConvertible"];

const CONCEPTUAL_MARKERS: &[&str] = &["how", "what", "where", "why"];

fn is_conceptual_query(query: &str) -> bool {
    let lower = query.to_lowercase();
    CONCEPTUAL_MARKERS.iter().any(|marker| lower.starts_with(marker) || lower.contains(marker))
}

fn is_public_signature(signature: &str) -> bool {
    let trimmed = signature.trim_start();
    trimmed.starts_with("pub ") || trimmed.starts_with("public ") || trimmed.starts_with("open ")
}

fn in_source_tree(path: &str) -> bool {
    path.contains("/Sources/") || path.contains("/src/")
}

/// Computes the product of every applicable re-ranking multiplier for one
/// chunk against one query. `term_frequency` is the result of
/// `get_term_frequency(query)` against the lexical index.
pub fn rerank_multiplier(chunk: &Chunk, query: &str, term_frequency: i64) -> f64 {
    let mut multiplier = 1.0;

    if chunk.symbols.iter().any(|s| s == query) && term_frequency < 10 {
        multiplier *= 2.5;
    }
    if in_source_tree(&chunk.path) {
        multiplier *= 1.1;
    }
    if chunk.signature.as_deref().is_some_and(is_public_signature) {
        multiplier *= 1.1;
    }
    if chunk.kind == ChunkKind::Extension
        && chunk.conformances.iter().any(|c| STANDARD_PROTOCOLS.contains(&c.as_str()))
        && is_conceptual_query(query)
    {
        multiplier *= 0.5;
    }

    multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_model::Chunk;

    fn base_chunk() -> Chunk {
        Chunk::new("c1", "lib/a.rs", "fn foo() {}", 1, 1, ChunkKind::Function, "rust", "fh", "ch")
    }

    #[test]
    fn exact_symbol_rarity_boost_applies_when_term_is_rare() {
        let mut chunk = base_chunk();
        chunk.symbols = vec!["Widget".into()];
        assert_eq!(rerank_multiplier(&chunk, "Widget", 3), 2.5);
    }

    #[test]
    fn exact_symbol_boost_does_not_apply_when_term_is_common() {
        let mut chunk = base_chunk();
        chunk.symbols = vec!["Widget".into()];
        assert_eq!(rerank_multiplier(&chunk, "Widget", 50), 1.0);
    }

    #[test]
    fn source_tree_boost_applies_for_sources_directory() {
        let mut chunk = base_chunk();
        chunk.path = "Project/Sources/Widget.swift".into();
        assert_eq!(rerank_multiplier(&chunk, "unrelated", 100), 1.1);
    }

    #[test]
    fn public_declaration_boost_applies() {
        let mut chunk = base_chunk();
        chunk.signature = Some("pub fn foo()".into());
        assert_eq!(rerank_multiplier(&chunk, "unrelated", 100), 1.1);
    }

    #[test]
    fn standard_protocol_extension_demoted_for_conceptual_query() {
        let mut chunk = base_chunk();
        chunk.kind = ChunkKind::Extension;
        chunk.conformances = vec!["Equatable".into()];
        assert_eq!(rerank_multiplier(&chunk, "how does equality work", 100), 0.5);
    }

    #[test]
    fn standard_protocol_extension_not_demoted_for_non_conceptual_query() {
        let mut chunk = base_chunk();
        chunk.kind = ChunkKind::Extension;
        chunk.conformances = vec!["Equatable".into()];
        assert_eq!(rerank_multiplier(&chunk, "Widget.equals", 100), 1.0);
    }

    #[test]
    fn multipliers_compose_multiplicatively() {
        let mut chunk = base_chunk();
        chunk.path = "Project/Sources/Widget.swift".into();
        chunk.signature = Some("pub fn foo()".into());
        assert!((rerank_multiplier(&chunk, "unrelated", 100) - 1.1 * 1.1).abs() < 1e-9);
    }
}
