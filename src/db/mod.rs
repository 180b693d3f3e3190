pub mod constituent_queries;
