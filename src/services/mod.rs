mod regenerate;
mod remover;

pub use regenerate::{
    ConfigRegenerator, JsonConfigWriter, LogOnlyRegenerator, RegenerateError, RegenerateResult,
    create_regenerator,
};
pub use remover::{ClientRemover, RemoveError};
