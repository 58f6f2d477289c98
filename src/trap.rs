//! The trap vector table: one thin stub per vector, each capturing an
//! [`InterruptStateSnapshot`] and handing it to the dispatcher. No business
//! logic lives at this layer.

use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use crate::isr::{self, InterruptStateSnapshot};
use crate::pic::PICS;

fn snapshot(frame: &InterruptStackFrame, vector: u8, error_code: u64) -> InterruptStateSnapshot {
    InterruptStateSnapshot {
        vector,
        error_code,
        instruction_pointer: frame.instruction_pointer.as_u64(),
        code_segment: frame.code_segment.0 as u64,
        cpu_flags: frame.cpu_flags.bits(),
        stack_pointer: frame.stack_pointer.as_u64(),
        stack_segment: frame.stack_segment.0 as u64,
    }
}

macro_rules! exception_stub {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame) {
            isr::dispatch(&snapshot(&frame, $vector, 0));
        }
    };
}

macro_rules! exception_stub_with_error {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame, error_code: u64) {
            isr::dispatch(&snapshot(&frame, $vector, error_code));
        }
    };
}

exception_stub!(divide_error_stub, 0);
exception_stub!(debug_stub, 1);
exception_stub!(non_maskable_interrupt_stub, 2);
exception_stub!(breakpoint_stub, 3);
exception_stub!(overflow_stub, 4);
exception_stub!(bound_range_exceeded_stub, 5);
exception_stub!(invalid_opcode_stub, 6);
exception_stub!(device_not_available_stub, 7);
exception_stub_with_error!(invalid_tss_stub, 10);
exception_stub_with_error!(segment_not_present_stub, 11);
exception_stub_with_error!(stack_segment_fault_stub, 12);
exception_stub_with_error!(general_protection_fault_stub, 13);
exception_stub!(x87_floating_point_stub, 16);
exception_stub_with_error!(alignment_check_stub, 17);
exception_stub!(simd_floating_point_stub, 19);
exception_stub!(virtualization_stub, 20);
exception_stub_with_error!(cp_protection_stub, 21);
exception_stub!(hv_injection_stub, 28);
exception_stub_with_error!(vmm_communication_stub, 29);
exception_stub_with_error!(security_stub, 30);

extern "x86-interrupt" fn double_fault_stub(frame: InterruptStackFrame, error_code: u64) -> ! {
    isr::dispatch(&snapshot(&frame, 8, error_code));
    crate::panic::park()
}

extern "x86-interrupt" fn machine_check_stub(frame: InterruptStackFrame) -> ! {
    isr::dispatch(&snapshot(&frame, 18, 0));
    crate::panic::park()
}

extern "x86-interrupt" fn page_fault_stub(
    frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    isr::dispatch(&snapshot(&frame, 14, error_code.bits()));
}

macro_rules! irq_stub {
    ($name:ident, $line:expr) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame) {
            isr::dispatch(&snapshot(&frame, 32 + $line, 0));
        }
    };
}

irq_stub!(irq0_stub, 0);
irq_stub!(irq1_stub, 1);
irq_stub!(irq2_stub, 2);
irq_stub!(irq3_stub, 3);
irq_stub!(irq4_stub, 4);
irq_stub!(irq5_stub, 5);
irq_stub!(irq6_stub, 6);
irq_stub!(irq7_stub, 7);
irq_stub!(irq8_stub, 8);
irq_stub!(irq9_stub, 9);
irq_stub!(irq10_stub, 10);
irq_stub!(irq11_stub, 11);
irq_stub!(irq12_stub, 12);
irq_stub!(irq13_stub, 13);
irq_stub!(irq14_stub, 14);
irq_stub!(irq15_stub, 15);

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.divide_error.set_handler_fn(divide_error_stub);
        idt.debug.set_handler_fn(debug_stub);
        idt.non_maskable_interrupt
            .set_handler_fn(non_maskable_interrupt_stub);
        idt.breakpoint.set_handler_fn(breakpoint_stub);
        idt.overflow.set_handler_fn(overflow_stub);
        idt.bound_range_exceeded
            .set_handler_fn(bound_range_exceeded_stub);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_stub);
        idt.device_not_available
            .set_handler_fn(device_not_available_stub);
        // the double fault stub runs on its own stack so a corrupt kernel
        // stack cannot escalate into a triple fault
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_stub)
                .set_stack_index(crate::gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.invalid_tss.set_handler_fn(invalid_tss_stub);
        idt.segment_not_present
            .set_handler_fn(segment_not_present_stub);
        idt.stack_segment_fault
            .set_handler_fn(stack_segment_fault_stub);
        idt.general_protection_fault
            .set_handler_fn(general_protection_fault_stub);
        idt.page_fault.set_handler_fn(page_fault_stub);
        idt.x87_floating_point.set_handler_fn(x87_floating_point_stub);
        idt.alignment_check.set_handler_fn(alignment_check_stub);
        idt.machine_check.set_handler_fn(machine_check_stub);
        idt.simd_floating_point
            .set_handler_fn(simd_floating_point_stub);
        idt.virtualization.set_handler_fn(virtualization_stub);
        idt.cp_protection_exception.set_handler_fn(cp_protection_stub);
        idt.hv_injection_exception.set_handler_fn(hv_injection_stub);
        idt.vmm_communication_exception
            .set_handler_fn(vmm_communication_stub);
        idt.security_exception.set_handler_fn(security_stub);

        let mut vector = 32u8;
        for stub in [
            irq0_stub, irq1_stub, irq2_stub, irq3_stub, irq4_stub, irq5_stub, irq6_stub,
            irq7_stub, irq8_stub, irq9_stub, irq10_stub, irq11_stub, irq12_stub, irq13_stub,
            irq14_stub, irq15_stub,
        ] {
            idt[vector].set_handler_fn(stub);
            vector += 1;
        }

        idt
    };
}

/// Installs the trap table and brings hardware interrupt delivery up.
/// Enabling delivery is deliberately the last step: no trap can be taken
/// before the table is in place.
pub fn init() {
    IDT.load();

    PICS.lock().remap();

    isr::bring_delivery_online();
}
