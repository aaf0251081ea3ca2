pub mod hir_datatypes;
pub mod hir_nodes;
pub mod hir_validation;
pub mod place;

#[cfg(test)]
pub(crate) mod tests;
