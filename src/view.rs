use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::trace;

use crate::record::{COLUMNS, ColumnId, Product, default_order};

/// Rows shown per page. Fixed for the life of the program.
pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// The single active sort. `None` on the model means original fetch order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortSpec {
    pub column: ColumnId,
    pub direction: Direction,
}

/// Per-column filter terms. Entries combine with AND, an absent entry means
/// no filter on that column.
pub type FilterState = BTreeMap<ColumnId, String>;

/// Transient pick-up/drop state of one column reorder interaction. Not part
/// of the persisted view state.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DragState {
    pub dragging: Option<ColumnId>,
    pub hover: Option<ColumnId>,
}

/// Row indices (into the raw record slice) that survive the global search
/// and the per-column filters. Search first, OR across all column values,
/// then each filter, AND together. Matching is case-insensitive substring
/// over the raw stringified value (`9.99`, never `$9.99`).
pub fn matching_rows(rows: &[Product], search: &str, filters: &FilterState) -> Vec<usize> {
    let term = search.trim().to_lowercase();
    let active: Vec<(ColumnId, String)> = filters
        .iter()
        .map(|(id, value)| (*id, value.trim().to_lowercase()))
        .filter(|(_, value)| !value.is_empty())
        .collect();

    (0..rows.len())
        .into_par_iter()
        .filter(|&idx| {
            let product = &rows[idx];
            if !term.is_empty()
                && !COLUMNS
                    .iter()
                    .any(|spec| spec.id.value(product).raw().to_lowercase().contains(&term))
            {
                return false;
            }
            active
                .iter()
                .all(|(id, value)| id.value(product).raw().to_lowercase().contains(value))
        })
        .collect()
}

/// Stable sort of the given row indices by one column. `None` keeps the
/// incoming order, ties keep their relative input order in both directions.
pub fn sort_rows(rows: &[Product], mut indices: Vec<usize>, sort: Option<&SortSpec>) -> Vec<usize> {
    let Some(spec) = sort else {
        return indices;
    };
    indices.sort_by(|&a, &b| {
        let ord = spec.column.value(&rows[a]).compare(&spec.column.value(&rows[b]));
        match spec.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    });
    indices
}

/// Pages counted over the filtered set. At least one page, even when empty,
/// so the UI always has a page to show.
pub fn page_count(filtered: usize) -> usize {
    std::cmp::max(1, filtered.div_ceil(PAGE_SIZE))
}

/// The window `[page_index * PAGE_SIZE, ..+PAGE_SIZE)` clipped to the row
/// count. An out-of-range page index yields an empty page, never an error.
pub fn page_slice(indices: &[usize], page_index: usize) -> &[usize] {
    let begin = page_index.saturating_mul(PAGE_SIZE);
    if begin >= indices.len() {
        return &[];
    }
    let end = std::cmp::min(begin + PAGE_SIZE, indices.len());
    &indices[begin..end]
}

/// Move `source` so it lands exactly in the slot `target` currently sits in,
/// shifting the target and everything between by one. No-op when source and
/// target are equal or either is missing from the order.
pub fn reorder(order: &[ColumnId], source: ColumnId, target: ColumnId) -> Vec<ColumnId> {
    let mut new_order = order.to_vec();
    if source == target {
        return new_order;
    }
    let (Some(src_pos), Some(tgt_pos)) = (
        order.iter().position(|&id| id == source),
        order.iter().position(|&id| id == target),
    ) else {
        return new_order;
    };
    new_order.remove(src_pos);
    new_order.insert(tgt_pos, source);
    new_order
}

/// The derived visible page: row indices into the raw record slice plus the
/// counts the pagination footer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView {
    pub rows: Vec<usize>,
    pub filtered_count: usize,
    pub page_count: usize,
}

/// All user-driven view state, composed into one visible page by
/// [`ViewState::compute`] on every change. Column order is presentation
/// only and never feeds the row pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub search: String,
    pub filters: FilterState,
    pub sort: Option<SortSpec>,
    pub page_index: usize,
    pub order: Vec<ColumnId>,
    pub drag: DragState,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            search: String::new(),
            filters: FilterState::new(),
            sort: None,
            page_index: 0,
            order: default_order(),
            drag: DragState::default(),
        }
    }
}

impl ViewState {
    /// search -> filters -> sort -> page. Synchronous and total.
    pub fn compute(&self, rows: &[Product]) -> PageView {
        let matching = matching_rows(rows, &self.search, &self.filters);
        let sorted = sort_rows(rows, matching, self.sort.as_ref());
        let filtered_count = sorted.len();
        PageView {
            rows: page_slice(&sorted, self.page_index).to_vec(),
            filtered_count,
            page_count: page_count(filtered_count),
        }
    }

    /// Changing the search term jumps back to the first page so the shrunken
    /// set never strands the user on an empty page.
    pub fn set_search(&mut self, term: impl Into<String>) {
        self.search = term.into();
        self.page_index = 0;
    }

    /// An empty value removes the filter. Non-filterable columns are ignored.
    /// Jumps back to the first page like a search edit.
    pub fn set_filter(&mut self, column: ColumnId, value: String) {
        if !column.spec().filterable {
            return;
        }
        if value.trim().is_empty() {
            self.filters.remove(&column);
        } else {
            self.filters.insert(column, value);
        }
        self.page_index = 0;
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
        self.page_index = 0;
    }

    /// The header-click protocol: same column cycles ascending -> descending
    /// -> ascending, a different column always starts ascending. Once any
    /// column was sorted there is no unsorted state reachable from here.
    pub fn toggle_sort(&mut self, column: ColumnId) {
        if !column.spec().sortable {
            return;
        }
        let direction = match self.sort {
            Some(SortSpec {
                column: active,
                direction: Direction::Ascending,
            }) if active == column => Direction::Descending,
            _ => Direction::Ascending,
        };
        self.sort = Some(SortSpec { column, direction });
        trace!("Sort {:?} {:?}", column, direction);
    }

    pub fn next_page(&mut self, page_count: usize) {
        self.page_index = std::cmp::min(self.page_index + 1, page_count.saturating_sub(1));
    }

    pub fn previous_page(&mut self) {
        self.page_index = self.page_index.saturating_sub(1);
    }

    pub fn pick_up(&mut self, column: ColumnId) {
        self.drag.dragging = Some(column);
        self.drag.hover = Some(column);
    }

    /// Pure UI feedback while aiming, no order mutation.
    pub fn hover(&mut self, column: ColumnId) {
        if self.drag.dragging.is_some() {
            self.drag.hover = Some(column);
        }
    }

    pub fn drop_on(&mut self, target: ColumnId) {
        if let Some(source) = self.drag.dragging {
            self.order = reorder(&self.order, source, target);
        }
        self.drag = DragState::default();
    }

    pub fn cancel_drag(&mut self) {
        self.drag = DragState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ColumnId::*;

    fn product(
        id: u64,
        title: &str,
        brand: &str,
        category: &str,
        price: f64,
        rating: f64,
        stock: u64,
    ) -> Product {
        Product {
            id,
            title: title.to_string(),
            brand: brand.to_string(),
            category: category.to_string(),
            price,
            rating,
            stock,
            thumbnail: String::new(),
        }
    }

    fn inventory() -> Vec<Product> {
        vec![
            product(1, "iPhone 9", "Apple", "smartphones", 549.0, 4.69, 94),
            product(2, "MacBook Pro", "Apple", "laptops", 1749.0, 4.57, 83),
            product(3, "Perfume Oil", "Impression", "fragrances", 13.99, 4.26, 65),
            product(4, "Galaxy S10", "Samsung", "smartphones", 699.99, 4.09, 32),
            product(5, "Surface Laptop", "Microsoft", "laptops", 1499.0, 4.57, 68),
        ]
    }

    #[test]
    fn empty_search_and_filters_keep_everything() {
        let rows = inventory();
        assert_eq!(
            matching_rows(&rows, "", &FilterState::new()),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn global_search_matches_any_field_case_insensitively() {
        let rows = inventory();
        // Brand hit.
        assert_eq!(matching_rows(&rows, "apple", &FilterState::new()), vec![0, 1]);
        // Stringified price hit, surrounding whitespace trimmed.
        assert_eq!(matching_rows(&rows, " 549 ", &FilterState::new()), vec![0]);
        // Stringified stock hit.
        assert_eq!(matching_rows(&rows, "94", &FilterState::new()), vec![0]);
    }

    #[test]
    fn filters_combine_with_and_and_commute() {
        let rows = inventory();
        let mut a = FilterState::new();
        a.insert(Category, "laptops".to_string());
        a.insert(Brand, "m".to_string());
        let mut b = FilterState::new();
        b.insert(Brand, "m".to_string());
        b.insert(Category, "laptops".to_string());

        let hits = matching_rows(&rows, "", &a);
        assert_eq!(hits, vec![4]);
        assert_eq!(hits, matching_rows(&rows, "", &b));
    }

    #[test]
    fn search_and_filters_form_one_conjunction() {
        let rows = inventory();
        let mut filters = FilterState::new();
        filters.insert(Category, "laptops".to_string());
        // "4.57" matches rows 1 and 4 via rating, the filter narrows nothing
        // further here, so the result equals the intersection.
        assert_eq!(matching_rows(&rows, "4.57", &filters), vec![1, 4]);
    }

    #[test]
    fn filters_match_raw_values_not_display_strings() {
        let rows = inventory();
        let mut filters = FilterState::new();
        filters.insert(Price, "13.99".to_string());
        assert_eq!(matching_rows(&rows, "", &filters), vec![2]);

        // The rendered "$13.99" form never matches.
        filters.insert(Price, "$13".to_string());
        assert_eq!(matching_rows(&rows, "", &filters), Vec::<usize>::new());
    }

    #[test]
    fn category_filter_scenario() {
        let mut rows = Vec::new();
        for i in 0..5 {
            rows.push(product(i, "x", "b", "A", 1.0, 1.0, 1));
        }
        for i in 5..12 {
            rows.push(product(i, "x", "b", "B", 1.0, 1.0, 1));
        }
        let mut filters = FilterState::new();
        filters.insert(Category, "a".to_string());
        let hits = matching_rows(&rows, "", &filters);
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|&i| rows[i].category == "A"));
    }

    #[test]
    fn sort_is_stable_in_both_directions() {
        let rows = vec![
            product(1, "a", "", "", 10.0, 4.5, 1),
            product(2, "b", "", "", 5.0, 4.5, 2),
            product(3, "c", "", "", 10.0, 4.5, 3),
            product(4, "d", "", "", 5.0, 4.5, 4),
        ];
        let asc = sort_rows(
            &rows,
            vec![0, 1, 2, 3],
            Some(&SortSpec {
                column: Price,
                direction: Direction::Ascending,
            }),
        );
        assert_eq!(asc, vec![1, 3, 0, 2]);

        let desc = sort_rows(
            &rows,
            vec![0, 1, 2, 3],
            Some(&SortSpec {
                column: Price,
                direction: Direction::Descending,
            }),
        );
        assert_eq!(desc, vec![0, 2, 1, 3]);

        // All ratings are equal, either direction keeps the input order.
        let tied = sort_rows(
            &rows,
            vec![0, 1, 2, 3],
            Some(&SortSpec {
                column: Rating,
                direction: Direction::Descending,
            }),
        );
        assert_eq!(tied, vec![0, 1, 2, 3]);
    }

    #[test]
    fn no_sort_keeps_fetch_order() {
        let rows = inventory();
        assert_eq!(sort_rows(&rows, vec![3, 1, 4], None), vec![3, 1, 4]);
    }

    #[test]
    fn toggle_cycles_ascending_descending_ascending() {
        let mut view = ViewState::default();
        view.toggle_sort(Price);
        assert_eq!(
            view.sort,
            Some(SortSpec {
                column: Price,
                direction: Direction::Ascending
            })
        );
        view.toggle_sort(Price);
        assert_eq!(view.sort.unwrap().direction, Direction::Descending);
        view.toggle_sort(Price);
        assert_eq!(view.sort.unwrap().direction, Direction::Ascending);

        // A different column always starts ascending and takes over.
        view.toggle_sort(Price);
        view.toggle_sort(Title);
        assert_eq!(
            view.sort,
            Some(SortSpec {
                column: Title,
                direction: Direction::Ascending
            })
        );
    }

    #[test]
    fn twenty_three_rows_make_three_pages() {
        let indices: Vec<usize> = (0..23).collect();
        assert_eq!(page_count(indices.len()), 3);
        assert_eq!(page_slice(&indices, 0).len(), 10);
        assert_eq!(page_slice(&indices, 2), &[20, 21, 22]);
        assert_eq!(page_slice(&indices, 5), &[] as &[usize]);

        let mut view = ViewState::default();
        view.page_index = 2;
        view.next_page(3);
        assert_eq!(view.page_index, 2);
        view.previous_page();
        assert_eq!(view.page_index, 1);
        view.page_index = 0;
        view.previous_page();
        assert_eq!(view.page_index, 0);
    }

    #[test]
    fn empty_set_still_has_one_page() {
        assert_eq!(page_count(0), 1);
        assert_eq!(page_slice(&[], 0), &[] as &[usize]);
    }

    #[test]
    fn filter_edits_reset_the_page_sort_does_not() {
        let mut view = ViewState::default();
        view.page_index = 2;
        view.set_search("phone");
        assert_eq!(view.page_index, 0);

        view.page_index = 2;
        view.set_filter(Brand, "apple".to_string());
        assert_eq!(view.page_index, 0);

        view.page_index = 2;
        view.toggle_sort(Price);
        assert_eq!(view.page_index, 2);
    }

    #[test]
    fn empty_filter_value_removes_the_entry() {
        let mut view = ViewState::default();
        view.set_filter(Brand, "apple".to_string());
        assert_eq!(view.filters.len(), 1);
        view.set_filter(Brand, "  ".to_string());
        assert!(view.filters.is_empty());
    }

    #[test]
    fn reorder_lands_on_the_target_slot() {
        let order = default_order();
        // Dragging forward: the source lands where the target sat, the
        // target shifts one slot towards the source.
        assert_eq!(
            reorder(&order, Title, Category),
            vec![Brand, Category, Title, Price, Rating, Stock]
        );
        // Dragging backwards.
        assert_eq!(
            reorder(&order, Stock, Brand),
            vec![Title, Stock, Brand, Category, Price, Rating]
        );
    }

    #[test]
    fn reorder_noops_keep_the_order() {
        let order = default_order();
        assert_eq!(reorder(&order, Price, Price), order);

        let partial = vec![Title, Brand, Category];
        assert_eq!(reorder(&partial, Stock, Brand), partial);
        assert_eq!(reorder(&partial, Brand, Stock), partial);
    }

    #[test]
    fn reorder_always_yields_a_permutation() {
        let mut order = default_order();
        for (source, target) in [(Title, Stock), (Rating, Title), (Brand, Brand)] {
            order = reorder(&order, source, target);
            let mut sorted = order.clone();
            sorted.sort();
            let mut full = default_order();
            full.sort();
            assert_eq!(sorted, full);
        }
    }

    #[test]
    fn drag_protocol_drops_or_cancels() {
        let mut view = ViewState::default();
        view.pick_up(Title);
        assert_eq!(view.drag.dragging, Some(Title));
        view.hover(Category);
        assert_eq!(view.drag.hover, Some(Category));

        // Cancel clears the interaction without touching the order.
        view.cancel_drag();
        assert_eq!(view.drag, DragState::default());
        assert_eq!(view.order, default_order());

        view.pick_up(Title);
        view.drop_on(Category);
        assert_eq!(view.drag, DragState::default());
        assert_eq!(
            view.order,
            vec![Brand, Category, Title, Price, Rating, Stock]
        );
    }

    #[test]
    fn compute_composes_the_pipeline() {
        let rows = inventory();
        let mut view = ViewState::default();
        view.set_filter(Category, "laptops".to_string());
        view.toggle_sort(Price);

        let page = view.compute(&rows);
        assert_eq!(page.filtered_count, 2);
        assert_eq!(page.page_count, 1);
        assert_eq!(page.rows, vec![4, 1]);

        // A stranded page index yields an empty page, not an error.
        view.page_index = 7;
        let page = view.compute(&rows);
        assert_eq!(page.rows, Vec::<usize>::new());
        assert_eq!(page.filtered_count, 2);
    }
}
