use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub tools: Vec<WebSearchTool>,
    pub include: Vec<&'static str>,
    pub input: Vec<InputMessage>,
}

#[derive(Debug, Serialize)]
pub struct WebSearchTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<DomainFilters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_location: Option<UserLocation>,
}

#[derive(Debug, Serialize)]
pub struct DomainFilters {
    pub allowed_domains: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UserLocation {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub country: String,
}

#[derive(Debug, Serialize)]
pub struct InputMessage {
    pub role: &'static str,
    pub content: String,
}
