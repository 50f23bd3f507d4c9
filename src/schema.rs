//! Static schema description embedded in every generation prompt
//!
//! The demo database has a single `customers` table populated by the seed
//! binary. The description is hand-authored and immutable for the process
//! lifetime; the generator grounds its SQL in this text and nothing else.

pub const CUSTOMERS_SCHEMA: &str = "\
Table: customers
Columns:
  id           BIGINT    primary key
  name         TEXT      customer display name
  email        TEXT      contact address
  revenue      BIGINT    lifetime revenue in whole currency units
  signup_date  DATE      date the customer signed up";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_names_demo_table_and_columns() {
        assert!(CUSTOMERS_SCHEMA.contains("customers"));
        for col in ["id", "name", "email", "revenue", "signup_date"] {
            assert!(CUSTOMERS_SCHEMA.contains(col), "missing column {}", col);
        }
    }
}
