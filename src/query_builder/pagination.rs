/// LIMIT/OFFSET window for a page of results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl LimitOffset {
    /// Window for a 1-indexed page
    pub fn new(page: u32, per_page: u32) -> Self {
        let offset = if page > 0 {
            Some((page - 1).saturating_mul(per_page))
        } else {
            None
        };
        Self {
            limit: Some(per_page),
            offset,
        }
    }

    pub fn limit_only(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: None,
        }
    }

    pub fn to_sql(&self) -> String {
        let mut sql = String::new();

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }

    /// Apply the window to an in-memory sequence
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset.unwrap_or(0) as usize;
        let iter = items.into_iter().skip(offset);
        match self.limit {
            Some(limit) => iter.take(limit as usize).collect(),
            None => iter.collect(),
        }
    }

    /// Number of pages needed for `total_count` rows, never less than one
    pub fn total_pages(&self, total_count: u64) -> u64 {
        match self.limit {
            Some(limit) if limit > 0 => total_count.div_ceil(u64::from(limit)).max(1),
            _ => 1,
        }
    }

    pub fn has_next_page(&self, total_count: u64) -> bool {
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) if limit > 0 => {
                u64::from(offset) + u64::from(limit) < total_count
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_based_window() {
        let window = LimitOffset::new(2, 10);
        assert_eq!(window.limit, Some(10));
        assert_eq!(window.offset, Some(10));
        assert_eq!(window.to_sql(), " LIMIT 10 OFFSET 10");
    }

    #[test]
    fn test_first_page_window() {
        let window = LimitOffset::new(1, 20);
        assert_eq!(window.offset, Some(0));
        assert_eq!(window.to_sql(), " LIMIT 20 OFFSET 0");
    }

    #[test]
    fn test_limit_only() {
        assert_eq!(LimitOffset::limit_only(5).to_sql(), " LIMIT 5");
    }

    #[test]
    fn test_total_pages_calculation() {
        let window = LimitOffset::new(1, 5);
        assert_eq!(window.total_pages(30), 6);
        assert_eq!(window.total_pages(31), 7);
        assert_eq!(window.total_pages(0), 1);
    }

    #[test]
    fn test_slice_and_navigation() {
        let window = LimitOffset::new(3, 2);
        assert_eq!(window.slice((1..=7).collect::<Vec<_>>()), vec![5, 6]);
        assert!(window.has_next_page(7));
        assert!(!window.has_next_page(6));
        assert!(!LimitOffset::new(1, 0).has_next_page(10));
    }
}
