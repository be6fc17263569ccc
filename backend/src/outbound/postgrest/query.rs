//! Query-string encoding for PostgREST requests.
//!
//! Filters become `column=operator.value` pairs; ordering and limits use the
//! reserved `order` and `limit` parameters.

use reqwest::Url;

use crate::domain::ports::{Filter, RecordQuery};

/// Append the filters, ordering, and limit of `query` to `url`.
pub(super) fn apply_query(url: &mut Url, query: &RecordQuery) {
    let mut pairs = url.query_pairs_mut();
    for filter in &query.filters {
        pairs.append_pair(filter.column(), &filter_value(filter));
    }
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        pairs.append_pair("order", &format!("{}.{direction}", order.column));
    }
    if let Some(limit) = query.limit {
        pairs.append_pair("limit", &limit.to_string());
    }
}

/// `id=eq.{id}` selector used by partial updates.
pub(super) fn apply_id_selector(url: &mut Url, id: &str) {
    url.query_pairs_mut()
        .append_pair("id", &format!("eq.{}", quote_if_reserved(id)));
}

fn filter_value(filter: &Filter) -> String {
    match filter {
        Filter::Eq { value, .. } => format!("eq.{}", quote_if_reserved(value)),
        Filter::Neq { value, .. } => format!("neq.{}", quote_if_reserved(value)),
        Filter::NotEq { value, .. } => format!("not.eq.{}", quote_if_reserved(value)),
        Filter::In { values, .. } => {
            let list = values
                .iter()
                .map(|value| quote_if_reserved(value))
                .collect::<Vec<_>>()
                .join(",");
            format!("in.({list})")
        }
    }
}

/// Double-quote values that contain PostgREST list or grouping syntax.
fn quote_if_reserved(value: &str) -> String {
    if value.contains([',', '(', ')', '"', '\\']) || value.trim() != value {
        let escaped = value.replace('\\', r"\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        value.to_owned()
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    fn base() -> Url {
        Url::parse("https://desk.example.test/rest/v1/pwd").expect("valid url")
    }

    fn pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }

    #[rstest]
    fn encodes_today_query() {
        let query = RecordQuery::table("pwd")
            .filter(Filter::eq("date", "2026-10-19"))
            .filter(Filter::is_in("status", ["scheduled", "re-scheduled"]))
            .order_by("time", true)
            .limit(50);
        let mut url = base();

        apply_query(&mut url, &query);

        assert_eq!(
            pairs(&url),
            [
                ("date".to_owned(), "eq.2026-10-19".to_owned()),
                ("status".to_owned(), "in.(scheduled,re-scheduled)".to_owned()),
                ("order".to_owned(), "time.asc".to_owned()),
                ("limit".to_owned(), "50".to_owned()),
            ]
        );
    }

    #[rstest]
    #[case(Filter::neq("status", "completed"), "neq.completed")]
    #[case(Filter::not_eq("status", "completed"), "not.eq.completed")]
    #[case(Filter::eq("service", "Food, shelter"), "eq.\"Food, shelter\"")]
    #[case(Filter::is_in("service", ["a(b)", "c"]), "in.(\"a(b)\",c)")]
    fn encodes_each_operator(#[case] filter: Filter, #[case] expected: &str) {
        assert_eq!(filter_value(&filter), expected);
    }

    #[rstest]
    fn descending_order_without_filters() {
        let mut url = base();
        apply_query(&mut url, &RecordQuery::table("pwd").order_by("created_at", false));
        assert_eq!(url.query(), Some("order=created_at.desc"));
    }

    #[rstest]
    fn id_selector_targets_one_row() {
        let mut url = base();
        apply_id_selector(&mut url, "42");
        assert_eq!(url.query(), Some("id=eq.42"));
    }
}
