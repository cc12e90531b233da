#![allow(dead_code)]

pub mod shard_test;
pub mod sqlite_shards;

#[macro_export]
macro_rules! shard_test {
    ($name:ident, |$dialect:ident| $body:expr) => {
        paste::paste! {
            #[test]
            fn [<$name _mysql>]() {
                $crate::support::shard_test::run_shard_test(
                    shardline_engine::SqlDialect::MySql,
                    |$dialect| $body,
                );
            }

            #[test]
            fn [<$name _sqlite>]() {
                $crate::support::shard_test::run_shard_test(
                    shardline_engine::SqlDialect::Sqlite,
                    |$dialect| $body,
                );
            }
        }
    };
}
