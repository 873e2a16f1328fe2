//! Elasticsearch request bodies and response parsing.

use std::collections::BTreeSet;

use custody_types::{
    AuditSearchResults, KeywordField, PageRequest, SearchFilter, SearchKeywords,
    SignedCentralAuditEntry,
};
use serde_json::{Value, json};

use crate::error::{StorageError, StorageResult};
use crate::repo::MAX_KEYWORD_TERMS;

/// Default `index.max_result_window`: `from + size` may not exceed it.
pub(crate) const MAX_RESULT_WINDOW: usize = 10_000;

/// Index mappings: filterable and faceted fields are exact-match keywords.
pub(crate) fn index_mappings() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "actionTimestamp": { "type": "date", "format": "epoch_millis" },
                "persistenceTimestamp": { "type": "date", "format": "epoch_millis" },
                "sourceBcName": { "type": "keyword" },
                "sourceAppName": { "type": "keyword" },
                "sourceAppVersion": { "type": "keyword" },
                "sourceKeyId": { "type": "keyword" },
                "actionType": { "type": "keyword" },
                "actionSuccessful": { "type": "boolean" },
                "invalidSourceSignature": { "type": "boolean" },
                "auditingSvcAppName": { "type": "keyword" },
                "auditingSvcKeyId": { "type": "keyword" },
                "securityContext": {
                    "properties": {
                        "userId": { "type": "keyword" },
                        "appId": { "type": "keyword" },
                        "role": { "type": "keyword" }
                    }
                }
            }
        }
    })
}

/// `_search` body for a filter and clamped page.
///
/// Pages reaching past the result window are cut at its edge; a page wholly
/// beyond it asks for zero hits, which still reports the total.
pub(crate) fn search_body(filter: &SearchFilter, page: PageRequest) -> Value {
    let mut must: Vec<Value> = Vec::new();

    let matches = [
        ("securityContext.userId", &filter.user_id),
        ("sourceBcName", &filter.source_bc_name),
        ("sourceAppName", &filter.source_app_name),
        ("actionType", &filter.action_type),
    ];
    for (field, value) in matches {
        if let Some(value) = value {
            must.push(json!({ "match": { field: value } }));
        }
    }
    if let Some(successful) = filter.action_successful {
        must.push(json!({ "term": { "actionSuccessful": successful } }));
    }
    if filter.start_date.is_some() || filter.end_date.is_some() {
        let mut range = serde_json::Map::new();
        if let Some(start) = filter.start_date {
            range.insert("gte".into(), json!(start));
        }
        if let Some(end) = filter.end_date {
            range.insert("lte".into(), json!(end));
        }
        must.push(json!({ "range": { "actionTimestamp": range } }));
    }

    let query = if must.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "bool": { "must": must } })
    };

    let from = page.offset().min(MAX_RESULT_WINDOW);
    let size = page.size.min(MAX_RESULT_WINDOW.saturating_sub(from));

    json!({
        "query": query,
        "from": from,
        "size": size,
        "sort": [{ "actionTimestamp": { "order": "desc" } }],
        "track_total_hits": true
    })
}

/// Terms aggregations over every faceted field.
pub(crate) fn keywords_body() -> Value {
    let mut aggs = serde_json::Map::new();
    for field in KeywordField::ALL {
        aggs.insert(
            field.as_str().to_string(),
            json!({ "terms": { "field": field.as_str(), "size": MAX_KEYWORD_TERMS } }),
        );
    }
    json!({ "size": 0, "aggs": aggs })
}

/// Newline-delimited `_bulk` body. Document ids are entry ids; when a batch
/// repeats an id only its last occurrence is sent.
pub(crate) fn bulk_body(index: &str, entries: &[SignedCentralAuditEntry]) -> StorageResult<String> {
    let mut seen = BTreeSet::new();
    let latest: Vec<&SignedCentralAuditEntry> = entries
        .iter()
        .rev()
        .filter(|entry| seen.insert(entry.id()))
        .collect();

    let mut body = String::new();
    for entry in latest.into_iter().rev() {
        let action = json!({ "index": { "_index": index, "_id": entry.id().to_string() } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(entry)?);
        body.push('\n');
    }
    Ok(body)
}

/// Per-item outcome of a `_bulk` response.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct BulkOutcome {
    pub(crate) accepted: usize,
    /// `(document id, reason)` for each rejected item.
    pub(crate) failed: Vec<(String, String)>,
}

pub(crate) fn parse_bulk_response(response: &Value) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);

    for item in items {
        let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
            continue;
        };
        match result.get("error") {
            Some(error) => {
                let id = result
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let reason = error
                    .get("reason")
                    .and_then(Value::as_str)
                    .map_or_else(|| error.to_string(), ToString::to_string);
                outcome.failed.push((id, reason));
            },
            None => outcome.accepted = outcome.accepted.saturating_add(1),
        }
    }
    outcome
}

pub(crate) fn parse_search_response(
    response: &Value,
    page: PageRequest,
) -> StorageResult<AuditSearchResults> {
    let hits = response
        .get("hits")
        .ok_or_else(|| StorageError::Serialization("search response has no hits".into()))?;

    let total = hits
        .pointer("/total/value")
        .or_else(|| hits.get("total"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let total = usize::try_from(total).unwrap_or(usize::MAX);

    let items = hits
        .get("hits")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice)
        .iter()
        .map(|hit| {
            let source = hit
                .get("_source")
                .cloned()
                .ok_or_else(|| StorageError::Serialization("hit has no _source".into()))?;
            Ok(serde_json::from_value::<SignedCentralAuditEntry>(source)?)
        })
        .collect::<StorageResult<Vec<_>>>()?;

    Ok(AuditSearchResults {
        page_size: page.size,
        page_index: page.index,
        total_pages: page.total_pages(total),
        items,
    })
}

pub(crate) fn parse_keywords_response(response: &Value) -> Vec<SearchKeywords> {
    KeywordField::ALL
        .iter()
        .filter_map(|field| {
            let buckets = response
                .pointer(&format!("/aggregations/{}/buckets", field.as_str()))?
                .as_array()?;
            Some(SearchKeywords {
                field_name: field.as_str().to_string(),
                distinct_terms: buckets
                    .iter()
                    .filter_map(|b| b.get("key").and_then(Value::as_str))
                    .map(ToString::to_string)
                    .collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::central;

    #[test]
    fn test_search_body_without_filters() {
        let body = search_body(&SearchFilter::default(), PageRequest::default());
        assert_eq!(body["query"], json!({ "match_all": {} }));
        assert_eq!(body["from"], 0);
        assert_eq!(body["size"], 100);
        assert_eq!(body["sort"][0]["actionTimestamp"]["order"], "desc");
    }

    #[test]
    fn test_search_body_combines_filters() {
        let filter = SearchFilter {
            user_id: Some("u1".into()),
            action_type: Some("login".into()),
            action_successful: Some(false),
            start_date: Some(100),
            end_date: Some(200),
            ..SearchFilter::default()
        }
        .page(3, 20);

        let body = search_body(&filter, filter.page_request());
        let must = body["query"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 4);
        assert!(must.contains(&json!({ "match": { "securityContext.userId": "u1" } })));
        assert!(must.contains(&json!({ "match": { "actionType": "login" } })));
        assert!(must.contains(&json!({ "term": { "actionSuccessful": false } })));
        assert!(must.contains(&json!({ "range": { "actionTimestamp": { "gte": 100, "lte": 200 } } })));
        assert_eq!(body["from"], 60);
        assert_eq!(body["size"], 20);
    }

    #[test]
    fn test_deep_pages_stay_inside_result_window() {
        let straddling = PageRequest::clamped(Some(99), Some(101));
        let body = search_body(&SearchFilter::default(), straddling);
        assert_eq!(body["from"], 9_900);
        assert_eq!(body["size"], 100);

        let beyond = PageRequest::clamped(Some(500), Some(100));
        let body = search_body(&SearchFilter::default(), beyond);
        assert_eq!(body["from"], MAX_RESULT_WINDOW);
        assert_eq!(body["size"], 0);

        let partial = PageRequest::clamped(Some(1_428), Some(7));
        let body = search_body(&SearchFilter::default(), partial);
        assert_eq!(body["from"], 9_996);
        assert_eq!(body["size"], 4);
    }

    #[test]
    fn test_page_beyond_window_parses_as_empty() {
        let response = json!({
            "hits": { "total": { "value": 20_000, "relation": "eq" }, "hits": [] }
        });
        let page = PageRequest::clamped(Some(500), Some(100));
        let results = parse_search_response(&response, page).unwrap();
        assert!(results.items.is_empty());
        assert_eq!(results.page_index, 500);
        assert_eq!(results.total_pages, 200);
    }

    #[test]
    fn test_open_ended_range() {
        let filter = SearchFilter {
            end_date: Some(5),
            ..SearchFilter::default()
        };
        let body = search_body(&filter, filter.page_request());
        assert_eq!(
            body["query"]["bool"]["must"][0],
            json!({ "range": { "actionTimestamp": { "lte": 5 } } })
        );
    }

    #[test]
    fn test_keywords_body() {
        let body = keywords_body();
        assert_eq!(body["size"], 0);
        assert_eq!(body["aggs"]["sourceBcName"]["terms"]["field"], "sourceBcName");
        assert_eq!(body["aggs"]["actionType"]["terms"]["size"], 100);
    }

    #[test]
    fn test_bulk_body_uses_entry_ids() {
        let entries = [central("u1", "bc", "login", 1), central("u2", "bc", "login", 2)];
        let body = bulk_body("ml-auditing", &entries).unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 4);

        let action: Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(action["index"]["_index"], "ml-auditing");
        assert_eq!(action["index"]["_id"], entries[1].id().to_string());

        let doc: SignedCentralAuditEntry = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(doc, entries[1]);
    }

    #[test]
    fn test_bulk_body_sends_last_copy_of_repeated_id() {
        let first = central("u1", "bc", "login", 1);
        let mut redelivered = first.clone();
        redelivered.central.persistence_timestamp = 99;
        let other = central("u2", "bc", "login", 2);

        let body = bulk_body("ml-auditing", &[first, other.clone(), redelivered.clone()]).unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 4);

        let docs: Vec<SignedCentralAuditEntry> = [lines[1], lines[3]]
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(docs, vec![other, redelivered]);
    }

    #[test]
    fn test_parse_bulk_response_partial_failure() {
        let response = json!({
            "errors": true,
            "items": [
                { "index": { "_id": "a", "status": 201 } },
                { "index": { "_id": "b", "status": 400, "error": { "type": "mapper_parsing_exception", "reason": "bad field" } } },
                { "index": { "_id": "c", "status": 200 } }
            ]
        });
        let outcome = parse_bulk_response(&response);
        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.failed, vec![("b".to_string(), "bad field".to_string())]);
    }

    #[test]
    fn test_parse_search_response() {
        let entry = central("u1", "bc", "login", 7);
        let response = json!({
            "hits": {
                "total": { "value": 21, "relation": "eq" },
                "hits": [ { "_id": entry.id().to_string(), "_source": entry } ]
            }
        });
        let page = PageRequest::clamped(Some(1), Some(10));
        let results = parse_search_response(&response, page).unwrap();
        assert_eq!(results.total_pages, 3);
        assert_eq!(results.page_index, 1);
        assert_eq!(results.items, vec![entry]);
    }

    #[test]
    fn test_parse_search_response_rejects_garbage() {
        let result = parse_search_response(&json!({ "took": 1 }), PageRequest::default());
        assert!(matches!(result, Err(StorageError::Serialization(_))));

        let bad_doc = json!({ "hits": { "total": { "value": 1 }, "hits": [ { "_source": { "id": 5 } } ] } });
        assert!(parse_search_response(&bad_doc, PageRequest::default()).is_err());
    }

    #[test]
    fn test_parse_keywords_response() {
        let response = json!({
            "aggregations": {
                "sourceBcName": { "buckets": [ { "key": "bc-b", "doc_count": 2 }, { "key": "bc-a", "doc_count": 1 } ] },
                "actionType": { "buckets": [ { "key": "login", "doc_count": 3 } ] },
                "sourceAppName": { "buckets": [] }
            }
        });
        let keywords = parse_keywords_response(&response);
        assert_eq!(keywords.len(), 3);
        assert_eq!(keywords[0].field_name, "actionType");
        assert_eq!(keywords[0].distinct_terms, vec!["login"]);
        assert_eq!(keywords[1].distinct_terms, vec!["bc-b", "bc-a"]);
        assert!(keywords[2].distinct_terms.is_empty());

        assert!(parse_keywords_response(&json!({})).is_empty());
    }
}
