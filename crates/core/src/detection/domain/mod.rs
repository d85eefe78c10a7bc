pub mod plate_localizer;
