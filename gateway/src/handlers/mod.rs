pub mod claims;
pub mod cruxes;
pub mod health;
pub mod sort_claims_tree;
pub mod topic_tree;
