pub mod onnx_crnn_recognizer;
