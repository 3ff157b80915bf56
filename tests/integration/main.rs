//! Integration tests: full scheduler cycles over an in-memory exchange.

mod mock_exchange;
mod scheduler_loop;
