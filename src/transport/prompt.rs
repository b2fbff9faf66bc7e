use crate::model::{Language, SearchMode};

pub fn system_prompt(mode: SearchMode) -> &'static str {
    match mode {
        SearchMode::Basic => {
            "You are a web research specialist. Use web search to gather comprehensive and \
             accurate information on the given topic. Cite the source of every piece of \
             information."
        }
        SearchMode::Verify => {
            "You are a fact-checking specialist. Use web search to verify the accuracy of the \
             given claims. Trace each claim to its original source and classify the outcome as \
             confirmed, partially confirmed, unconfirmed, or false."
        }
        SearchMode::Deep => {
            "You are an in-depth research analyst. Make full use of web search to investigate \
             every aspect of the topic: history, current state, future outlook, and arguments \
             for and against. Draw on academic papers, industry reports, and news articles."
        }
    }
}

/// Wraps the query in an instruction selecting which language's sources to use.
pub fn user_query(query: &str, language: Language, primary_language: &str) -> String {
    match language {
        Language::Primary => {
            format!("Search for the following topic, focusing on {primary_language} sources: {query}")
        }
        Language::Secondary => {
            format!("Search comprehensively for the following topic using English sources: {query}")
        }
        Language::Both => format!(
            "Search comprehensively for the following topic using both {primary_language} and English sources: {query}"
        ),
    }
}
