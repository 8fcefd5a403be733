//! Python bindings for the nuclide_blocks disassembler

use clap::ValueEnum;
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::format::OutputFormat;
use crate::{parser::GoblinParser, strategy::Strategy, BinaryMetadata, BinaryParser, DisassemblyError};

fn to_py_err(e: DisassemblyError) -> PyErr {
    match e {
        DisassemblyError::IoError(e) => PyIOError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

/// Sweep every executable section and render the blocks.
fn render(
    bytes: &[u8],
    metadata: &BinaryMetadata,
    strategy: &str,
    output_format: &str,
) -> PyResult<String> {
    let strategy = Strategy::from_str(strategy, true)
        .map_err(|_| PyValueError::new_err(format!("Unknown strategy: {}", strategy)))?;
    let output_format: OutputFormat = output_format.parse().map_err(PyValueError::new_err)?;

    let mut blocks = Vec::new();
    for region in metadata.code_regions(bytes) {
        blocks.extend(strategy.run(metadata, &region).map_err(to_py_err)?);
    }

    output_format.get_formatter().format(&blocks).map_err(to_py_err)
}

/// Disassemble binary data with specified strategy and output format
#[pyfunction]
#[pyo3(signature = (binary_data, strategy="linear", output_format="text"))]
fn disassemble(binary_data: Vec<u8>, strategy: &str, output_format: &str) -> PyResult<String> {
    let metadata = GoblinParser::new().parse(&binary_data).map_err(to_py_err)?;
    render(&binary_data, &metadata, strategy, output_format)
}

/// Disassemble a file with specified strategy and output format
#[pyfunction]
#[pyo3(signature = (file_path, strategy="linear", output_format="text"))]
fn disassemble_file(file_path: &str, strategy: &str, output_format: &str) -> PyResult<String> {
    let (bytes, metadata) = GoblinParser::new().parse_file(file_path).map_err(to_py_err)?;
    render(&bytes, &metadata, strategy, output_format)
}

/// Python module initialization
#[pymodule]
fn nuclide_blocks(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(disassemble, m)?)?;
    m.add_function(wrap_pyfunction!(disassemble_file, m)?)?;

    let py = m.py();

    // Expose the enums as plain name -> value dicts
    let output_format = PyDict::new(py);
    for format in OutputFormat::available_formats() {
        output_format.set_item(format!("{:?}", format).to_uppercase(), format.to_string())?;
    }
    m.setattr("OutputFormat", output_format)?;

    let strategy = PyDict::new(py);
    strategy.set_item("LINEAR", "linear")?;
    strategy.set_item("RECURSIVE", "recursive")?;
    m.setattr("Strategy", strategy)?;

    Ok(())
}
