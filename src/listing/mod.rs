//! Filtering, searching and sorting of the loaded case and people lists.

pub mod cases;
pub mod people;

pub use cases::{CaseFilter, CaseSearchField, TypeFilter, available_years, filter_cases};
pub use people::{PeopleFilter, PersonSearchField, PersonSort, filter_people};
