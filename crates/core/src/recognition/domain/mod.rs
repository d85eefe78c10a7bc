pub mod recognition_engine;
pub mod region_preprocessor;
pub mod text_normalizer;
pub mod text_recognizer;
