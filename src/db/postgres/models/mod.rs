pub mod snapshot_record;
