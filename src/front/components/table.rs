use anyhow::anyhow;
use serde::{Deserialize, Serialize};

pub type Url = String;

const DEFAULT_ENTRIES_PER_PAGE: u32 = 25;
const MAX_ENTRIES_PER_PAGE: u32 = 1000;
const WINDOW: i64 = 3;

#[derive(Serialize, Default, Debug, PartialEq)]
pub struct Page {
    page_number: u32,
    is_current_page: bool,
    link: Url,
}

#[derive(Serialize, Default)]
pub struct TableComponent<T: Serialize + Default> {
    entries: Vec<T>,
    pages: Vec<Page>,
    first_page: Option<Url>,
    last_page: Option<Page>,
    previous_page: Option<Url>,
    next_page: Option<Url>,
    columns: Vec<String>,
    max_entries_per_page: u32,
    count: i64,
}

#[derive(Deserialize, Default)]
pub struct Query {
    page: Option<u32>,
    entries_per_page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryNormalized {
    page: u32,
    entries_per_page: u32,
}

impl QueryNormalized {
    pub fn limit(&self) -> i64 {
        self.entries_per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.entries_per_page as i64
    }
}

impl Query {
    pub fn normalize(&self) -> QueryNormalized {
        QueryNormalized {
            page: self.page.unwrap_or(1).max(1),
            entries_per_page: self
                .entries_per_page
                .unwrap_or(DEFAULT_ENTRIES_PER_PAGE)
                .clamp(1, MAX_ENTRIES_PER_PAGE),
        }
    }
}

/// Appends the paging parameters to `path`, which may already carry a
/// query string (filters).
fn page_link(path: &str, page: u32, per_page: u32) -> Url {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{path}{sep}page={page}&entries_per_page={per_page}")
}

impl<T: Serialize + Default> TableComponent<T> {
    pub fn new(entries: Vec<T>, count: i64, api_path: impl AsRef<str>, query: QueryNormalized) -> anyhow::Result<Self> {
        let path = api_path.as_ref();
        let per_page = query.entries_per_page;
        let number_of_pages = ((count.max(0) + per_page as i64 - 1) / per_page as i64) as u32;
        let current_page = query.page;

        let mut component = Self {
            entries,
            columns: get_struct_fields_names(T::default())?,
            max_entries_per_page: per_page,
            count,
            ..Default::default()
        };
        component.pages = (current_page as i64 - WINDOW..=current_page as i64 + WINDOW)
            .filter(|p| *p >= 1 && *p <= number_of_pages as i64)
            .map(|p| Page {
                page_number: p as u32,
                is_current_page: p == current_page as i64,
                link: page_link(path, p as u32, per_page),
            })
            .collect();

        let (Some(first), Some(last)) = (component.pages.first(), component.pages.last()) else {
            return Ok(component);
        };

        if last.page_number != number_of_pages {
            component.last_page = Some(Page {
                page_number: number_of_pages,
                is_current_page: false,
                link: page_link(path, number_of_pages, per_page),
            })
        };
        if first.page_number != 1 {
            component.first_page = Some(page_link(path, 1, per_page))
        };
        if current_page < number_of_pages {
            component.next_page = Some(page_link(path, current_page + 1, per_page))
        };
        if current_page > 1 {
            component.previous_page = Some(page_link(path, current_page - 1, per_page))
        };

        Ok(component)
    }
}

fn get_struct_fields_names(s: impl Serialize) -> anyhow::Result<Vec<String>> {
    let j = serde_json::to_value(s)?;
    let j = j.as_object().ok_or(anyhow!("it should be an object"))?;
    Ok(j.iter().map(|f| f.0).cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Default)]
    struct Row {
        number: String,
        total: String,
    }

    fn q(page: Option<u32>, per: Option<u32>) -> QueryNormalized {
        Query {
            page,
            entries_per_page: per,
        }
        .normalize()
    }

    #[test]
    fn normalisation() {
        let n = q(None, None);
        assert_eq!((n.limit(), n.offset()), (25, 0));
        let n = q(Some(0), Some(0));
        assert_eq!((n.limit(), n.offset()), (1, 0));
        let n = q(Some(3), Some(5000));
        assert_eq!((n.limit(), n.offset()), (1000, 2000));
        let n = q(Some(u32::MAX), Some(1000));
        assert!(n.offset() > 0);
    }

    #[test]
    fn window_around_current_page() {
        let t = TableComponent::<Row>::new(vec![], 250, "/api/sales", q(Some(6), Some(10))).unwrap();
        let pages: Vec<u32> = t.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(pages, vec![3, 4, 5, 6, 7, 8, 9]);
        assert!(t.pages[3].is_current_page);
        assert_eq!(t.first_page.as_deref(), Some("/api/sales?page=1&entries_per_page=10"));
        assert_eq!(t.last_page.as_ref().map(|p| p.page_number), Some(25));
        assert_eq!(t.previous_page.as_deref(), Some("/api/sales?page=5&entries_per_page=10"));
        assert_eq!(t.next_page.as_deref(), Some("/api/sales?page=7&entries_per_page=10"));
        assert_eq!(t.columns, vec!["number", "total"]);
    }

    #[test]
    fn edges() {
        let t = TableComponent::<Row>::new(vec![], 20, "/api/sales?status=paid", q(Some(1), Some(10))).unwrap();
        assert_eq!(t.pages.len(), 2);
        assert!(t.first_page.is_none() && t.previous_page.is_none() && t.last_page.is_none());
        assert_eq!(t.next_page.as_deref(), Some("/api/sales?status=paid&page=2&entries_per_page=10"));

        let empty = TableComponent::<Row>::new(vec![], 0, "/api/sales", q(None, None)).unwrap();
        assert!(empty.pages.is_empty() && empty.next_page.is_none());

        let past_end = TableComponent::<Row>::new(vec![], 20, "/api/sales", q(Some(9), Some(10))).unwrap();
        assert!(past_end.next_page.is_none());
    }
}
