
mod join_tests;
mod temporal_tests;
