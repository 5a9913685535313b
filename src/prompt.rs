pub const QUERY_PLACEHOLDER: &str = "$query$";
pub const SEARCH_RESULTS_PLACEHOLDER: &str = "$search_results$";
pub const OUTPUT_FORMAT_PLACEHOLDER: &str = "$output_format_instructions$";

pub const NO_EXACT_ANSWER: &str =
    "I could not find an exact answer in the available workshop material.";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are an educational assistant specialized in Retrieval-Augmented Generation (RAG) and semantic search systems.
Your role is to help students understand embeddings, vector search, chunking, cosine similarity and RAG architectures.

Answer the user's question using ONLY the information in the search results provided from the workshop material.

IMPORTANT:
- Use ONLY information from the search results of the educational material
- If the results do not contain enough information, answer: \"I could not find an exact answer in the available workshop material.\"
- Do not invent or fabricate information that is not present in the results
- Explain concepts clearly and didactically, helping students understand the fundamentals of RAG

User question:

$query$

Search results:

$search_results$

$output_format_instructions$";

/// Placeholder markers a custom template is missing.
pub fn missing_placeholders(template: &str) -> Vec<&'static str> {
    [
        QUERY_PLACEHOLDER,
        SEARCH_RESULTS_PLACEHOLDER,
        OUTPUT_FORMAT_PLACEHOLDER,
    ]
    .into_iter()
    .filter(|marker| !template.contains(marker))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_has_every_marker() {
        assert!(missing_placeholders(DEFAULT_PROMPT_TEMPLATE).is_empty());
        assert!(DEFAULT_PROMPT_TEMPLATE.contains(NO_EXACT_ANSWER));
    }

    #[test]
    fn reports_missing_markers() {
        let missing = missing_placeholders("Question: $query$");
        assert_eq!(
            missing,
            vec![SEARCH_RESULTS_PLACEHOLDER, OUTPUT_FORMAT_PLACEHOLDER]
        );
    }
}
