pub mod sqlite_plate_store;
