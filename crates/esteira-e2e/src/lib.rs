//! End-to-end suite for the queue adapters. All tests live under `tests/`;
//! the backend-bound ones are `#[ignore]`d and gated on `REDIS_URL` /
//! `DATABASE_URL`.
