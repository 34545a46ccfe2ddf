mod common;
mod listing_tests;
