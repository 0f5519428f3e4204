pub mod candidate_page;
pub mod company;
pub mod financials;
