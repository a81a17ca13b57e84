//! Repository traits for store operations.

pub mod expression;
pub mod genes;
pub mod oauth;
pub mod phenotypes;
pub mod scanners;
pub mod species;

pub use expression::ExpressionRepo;
pub use genes::GeneRepo;
pub use oauth::OAuthRepo;
pub use phenotypes::PhenotypeRepo;
pub use scanners::ScannerRepo;
pub use species::SpeciesRepo;
