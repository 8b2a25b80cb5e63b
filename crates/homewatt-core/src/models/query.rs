use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest<'a> {
    pub question: &'a str,
}

/// Answer from the query assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct QueryResponse {
    pub summary: String,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "Array<Record<string, unknown>> | null"))]
    pub data: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    pub sql_query_for_debug: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_response() {
        let json = r#"{"summary":"Your fridge used 3.2 kWh","data":[{"device":"Fridge","kwh":3.2}],"sql_query_for_debug":null}"#;
        let resp: QueryResponse = serde_json::from_str(json).expect("query response");
        assert_eq!(resp.summary, "Your fridge used 3.2 kWh");
        assert_eq!(resp.data.as_ref().map(Vec::len), Some(1));
        assert_eq!(resp.sql_query_for_debug, None);
    }

    #[test]
    fn test_parse_summary_only() {
        let resp: QueryResponse = serde_json::from_str(r#"{"summary":"Nothing yet"}"#).unwrap();
        assert_eq!(resp.data, None);
    }
}
