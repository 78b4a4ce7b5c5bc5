//! Prompt text and response schemas
//!
//! Schemas use the provider's OpenAPI subset with uppercase type names.

use serde_json::{json, Value};

pub const ANALYSIS_PROMPT: &str = "You are an expert research librarian. Read the attached \
document and extract its metadata. Return the document's title, a concise summary of \
3-5 sentences, the most important key points in the order they appear, full citation \
data (title, journal, year, authors in the order listed, literature type, and the \
scientific field it belongs to as mainTopic), and a short list of thematic tags. \
Use \"Primary Research\" for original studies, \"Review Article\" for reviews and \
meta-analyses, and \"Other\" for anything else. Leave journal or year empty when the \
document does not state them.";

pub const OUTLIER_PROMPT: &str = "You are checking whether a collection of research \
documents belongs to one scientific field. Identify the dominant field shared by most \
documents as mainTheme. Then list every document whose scientific field diverges from \
that theme, with a one-sentence reason. A document that shares the field but differs \
in literature type (for example a review article among primary studies) is NOT an \
outlier. Only field-level divergence qualifies. Use the exact filename given for each \
document. Return an empty outliers list when all documents fit the theme.";

pub const CHAT_PROMPT: &str = "You are a research assistant answering questions about the \
user's document collection. Base your answer on the documents below and cite them \
inline by title in square brackets, e.g. [Title]. You may use web search to add \
context, but make clear which statements come from the documents. End the answer with \
a \"Sources\" list naming every document you cited.";

pub const GAP_PROMPT: &str = "You are a research strategist. Given the question and answer \
below, use web search to identify one research gap the answer leaves open. Respond with \
a single JSON object and nothing else, using exactly these keys: \"identifiedGap\" \
(string), \"recommendedReadings\" (array of objects with \"title\", \"url\" and \
\"reason\"), and \"futureDirection\" (string). Recommend at most three readings.";

pub const REPORT_PROMPT: &str = "You are writing a structured research report from the \
answers a research assistant gave during a conversation. Reorganize the material by \
topic rather than by the order the questions were asked. Write four narrative \
sections: background, methods, results and discussion. Then compile a deduplicated \
reference list in APA style from every source the answers cite. Do not invent \
findings that the answers do not support.";

fn string() -> Value {
    json!({ "type": "STRING" })
}

fn string_list() -> Value {
    json!({ "type": "ARRAY", "items": string() })
}

pub fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": string(),
            "summary": string(),
            "keyPoints": string_list(),
            "citation": {
                "type": "OBJECT",
                "properties": {
                    "title": string(),
                    "journal": string(),
                    "year": string(),
                    "authors": string_list(),
                    "literatureType": {
                        "type": "STRING",
                        "enum": ["Primary Research", "Review Article", "Other"]
                    },
                    "mainTopic": string()
                },
                "required": ["title", "authors", "literatureType", "mainTopic"]
            },
            "thematicTags": string_list()
        },
        "required": ["title", "summary", "keyPoints", "citation", "thematicTags"]
    })
}

pub fn outlier_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "mainTheme": string(),
            "outliers": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "filename": string(),
                        "reason": string()
                    },
                    "required": ["filename", "reason"]
                }
            }
        },
        "required": ["mainTheme", "outliers"]
    })
}

pub fn report_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "background": string(),
            "methods": string(),
            "results": string(),
            "discussion": string(),
            "references": string_list()
        },
        "required": ["background", "methods", "results", "discussion", "references"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_required_fields_exist() {
        for schema in [analysis_schema(), outlier_schema(), report_schema()] {
            let properties = schema["properties"].as_object().unwrap();
            for field in schema["required"].as_array().unwrap() {
                assert!(properties.contains_key(field.as_str().unwrap()));
            }
        }
    }

    #[test]
    fn test_outlier_prompt_excludes_literature_type() {
        assert!(OUTLIER_PROMPT.contains("NOT an outlier"));
    }
}
