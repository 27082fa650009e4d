//! Tick-accurate simulator of a small stack processor, with the assembler
//! that produces its machine code.

mod asm;
pub mod cpu;
mod error;
pub mod isa;
mod object;
mod runner;

pub use asm::{assemble, AssembleOption, ObjectExt, Symbols};
pub use error::{Fault, Interrupt, RuntimeFault};
pub use object::{Image, Instruction};
pub use runner::{
    input_queue, render_output, simulate, simulate_traced, SimOption, SimReport, StopReason,
};

#[cfg(test)]
mod tests {
    use crate::{assemble, input_queue, simulate, AssembleOption, Image, SimOption, StopReason};

    #[test]
    fn test_hello() {
        let obj = assemble(crate::asm::tests::HELLO, AssembleOption::default()).unwrap();
        let report = simulate(&obj.image, input_queue(None), &SimOption::default()).unwrap();
        assert_eq!(report.text(), "Hello, World!");
        assert_eq!(report.stop, StopReason::Halted);
    }

    #[test]
    fn test_cat_through_codec() {
        let obj = assemble(crate::asm::tests::CAT, AssembleOption::default()).unwrap();
        let image: Image = obj.image.to_string().parse().unwrap();
        assert_eq!(image, obj.image);
        let report = simulate(&image, input_queue(Some("foo\n")), &SimOption::default()).unwrap();
        assert_eq!(report.text(), "foo\n");
        assert_eq!(report.stop, StopReason::Halted);
    }
}
