//! docseek application layer: engine bootstrap from configuration, the MCP
//! tool server and terminal output for the `docseek` binary.
pub mod bootstrap;
pub mod mcp;
pub mod output;
