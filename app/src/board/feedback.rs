use core::ptr::addr_of;

use hal::{
    adc::{Adc, AdcDevice, AdcInterrupt, Align, InputType, SampleTime},
    clocks::Clocks,
    dma::{DmaChannel, DmaPeriph},
    pac::ADC1,
};

use pmsm_foc::{MotorFeedbackSource, MotorInputs};

const I_A: u8 = 4;
const I_B: u8 = 15;
const VSENS: u8 = 3;
const POT: u8 = 11;

pub const SAMPLING_COUNT: usize = 4;
const ADC1_SEQUENCE: [u8; SAMPLING_COUNT] = [I_A, I_B, VSENS, POT];

/// Written by DMA, read by the control task between transfers
static mut ADC_READ_BUF: [u16; SAMPLING_COUNT] = [0; SAMPLING_COUNT];

/// ADC1 sequence of both phase currents, the bus voltage and the speed pot
pub struct AdcFeedback {
    adc: Adc<ADC1>,
}

impl AdcFeedback {
    pub fn new(adc1: ADC1, clock_cfg: &Clocks) -> Self {
        let mut adc = Adc::new_adc1(adc1, AdcDevice::One, Default::default(), clock_cfg.systick());

        for (i, &channel) in ADC1_SEQUENCE.iter().enumerate() {
            adc.set_sequence(channel, i as u8 + 1);
            adc.set_input_type(channel, InputType::SingleEnded);
            adc.set_sample_time(channel, SampleTime::T2);
        }
        adc.set_sequence_len(SAMPLING_COUNT as u8);

        // Left aligned: 12-bit samples land in the top of a u16
        adc.set_align(Align::Left);
        adc.enable_interrupt(AdcInterrupt::EndOfSequence);

        Self { adc }
    }

    /// Starts the DMA transfer of the next sequence
    pub fn begin_read(&mut self) {
        unsafe {
            self.adc.read_dma(
                &mut *core::ptr::addr_of_mut!(ADC_READ_BUF),
                &ADC1_SEQUENCE,
                DmaChannel::C1,
                Default::default(),
                DmaPeriph::Dma1,
            )
        };
    }

    fn samples() -> [u16; SAMPLING_COUNT] {
        unsafe { core::ptr::read_volatile(addr_of!(ADC_READ_BUF)) }
    }

    /// Speed demand, 0..=32767
    pub fn pot() -> i16 {
        unipolar(Self::samples()[3])
    }
}

/// Mid-scale is zero current; the shunt amplifier inverts
fn bipolar_inverted(raw: u16) -> i16 {
    (32768 - raw as i32).clamp(i16::MIN as i32 + 1, i16::MAX as i32) as i16
}

fn unipolar(raw: u16) -> i16 {
    (raw >> 1) as i16
}

impl MotorFeedbackSource for AdcFeedback {
    fn read(&mut self) -> MotorInputs {
        let buf = Self::samples();
        MotorInputs {
            ia: bipolar_inverted(buf[0]),
            ib: bipolar_inverted(buf[1]),
            ibus: 0,
            vdc: unipolar(buf[2]),
            pot: unipolar(buf[3]),
        }
    }
}
