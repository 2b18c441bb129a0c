/*
    Integration tests for the persistence core

    Test suite covering:
    - Schema lifecycle across restarts
    - Concurrent settings saves (no lost update)
    - Writer contention between index rebuilds and content writes
    - End-to-end ordered-listing scenarios
*/

pub mod lifecycle_tests;
