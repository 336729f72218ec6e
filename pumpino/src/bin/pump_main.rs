#![no_std]
#![no_main]

use core::cell::RefCell;

use critical_section::Mutex;
use defmt::{error, info, warn};
use fugit::RateExtU32;
use rp2040_hal::gpio::{FunctionI2C, Pin, PullUp};
use rp2040_hal::{
    clocks::{init_clocks_and_plls, Clock},
    pac,
    sio::Sio,
    watchdog::Watchdog,
    Timer, I2C,
};
use rp_pico::hal::pac::interrupt;
use rp_pico::{entry, hal, XOSC_CRYSTAL_FREQ};
use usb_device::bus::UsbBusAllocator;
use usb_device::device::{StringDescriptors, UsbDeviceBuilder, UsbVidPid};
use usbd_serial::SerialPort;

use common::channel::ChannelLayout;
use common::controller::PumpController;
use common::keypad::KeyDebouncer;
use common::screen::CharDisplay;
use common::storage::STORAGE_SPAN;
use common::timer::PumpTimer;
use embedded_hal::digital::OutputPin;
use generic::pump_proto::ChannelAddress;
use pumpino::bsp::config::{
    EEPROM_ADDRESS, I2C_FREQUENCY_HZ, KEYPAD_LAYOUT, LOCAL_BOARD, LOCAL_MOTOR, MESSAGE_HOLD_MS,
    MOTORS_PER_BOARD, MOTOR_PWM_FREQUENCY_HZ, MOTOR_SHIELD_BASE_ADDRESS, OLED_ADDRESS, OLED_ROTATE_180,
    PUMP_BOARDS, REVERSE_MOTOR_POLARITY, USB_VID_PID,
};
use pumpino::bsp::PumpI2c;
use pumpino::peripherals::eeprom::At24Eeprom;
use pumpino::peripherals::keypad_matrix::KeypadMatrix;
use pumpino::peripherals::motor_shield::MotorShields;
use pumpino::peripherals::oled_display::OledDisplay;
use pumpino::peripherals::rp2040_timer::Rp2040Timer;
use pumpino::peripherals::shared_i2c::{I2cBus, SharedI2c};
use pumpino::peripherals::usb_link;
use pumpino::{
    keypad_col0, keypad_col1, keypad_col2, keypad_col3, keypad_row0, keypad_row1, keypad_row2, keypad_row3,
    keypad_row4, pump_i2c, pump_i2c_scl, pump_i2c_sda, status_led,
};

/// AT24C32
const EEPROM_CAPACITY: u32 = 4_096;

static I2C_BUS: I2cBus<PumpI2c> = Mutex::new(RefCell::new(None));
static mut USB_BUS: Option<UsbBusAllocator<hal::usb::UsbBus>> = None;

#[entry]
fn main() -> ! {
    let mut pac = pac::Peripherals::take().unwrap();
    let sio = Sio::new(pac.SIO);
    let mut watchdog = Watchdog::new(pac.WATCHDOG);
    let clocks = init_clocks_and_plls(
        XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    let mut timer = Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let clock = Rp2040Timer::new(timer);
    let pins = rp_pico::Pins::new(pac.IO_BANK0, pac.PADS_BANK0, sio.gpio_bank0, &mut pac.RESETS);
    let mut led = status_led!(pins).into_push_pull_output();

    {
        // one I2C bus for shields, eeprom and display
        let sda: Pin<_, FunctionI2C, PullUp> = pump_i2c_sda!(pins).reconfigure();
        let scl: Pin<_, FunctionI2C, PullUp> = pump_i2c_scl!(pins).reconfigure();
        let i2c = I2C::i2c0(
            pump_i2c!(pac),
            sda,
            scl,
            I2C_FREQUENCY_HZ.Hz(),
            &mut pac.RESETS,
            clocks.system_clock.freq(),
        );
        critical_section::with(|cs| I2C_BUS.borrow_ref_mut(cs).replace(i2c));
    }

    {
        // Initialize USBCTRL (uart-over-usb)
        let usb_bus = UsbBusAllocator::new(hal::usb::UsbBus::new(
            pac.USBCTRL_REGS,
            pac.USBCTRL_DPRAM,
            clocks.usb_clock,
            true,
            &mut pac.RESETS,
        ));
        unsafe {
            // Note (safety): This is safe as interrupts haven't been started yet
            USB_BUS = Some(usb_bus);
        }
        let bus_ref = unsafe { USB_BUS.as_ref().unwrap() };

        let serial = SerialPort::new(bus_ref);
        let usb_dev = UsbDeviceBuilder::new(bus_ref, UsbVidPid(USB_VID_PID.0, USB_VID_PID.1))
            .strings(&[StringDescriptors::default()
                .manufacturer("Pumpino")
                .product("Syringe pump controller")
                .serial_number("0001")])
            .unwrap()
            .device_class(2) // from: https://www.usb.org/defined-class-codes
            .build();
        usb_link::install(usb_dev, serial);

        unsafe {
            pac::NVIC::unmask(hal::pac::Interrupt::USBCTRL_IRQ);
        };
    }

    let mut shields = MotorShields::new(
        SharedI2c::new(&I2C_BUS),
        MOTOR_SHIELD_BASE_ADDRESS,
        PUMP_BOARDS,
        REVERSE_MOTOR_POLARITY,
    );
    if let Err(e) = shields.init(MOTOR_PWM_FREQUENCY_HZ, &mut timer) {
        error!("motor shield init failed: {}", e);
    }

    let mut display = match OledDisplay::new(SharedI2c::new(&I2C_BUS), OLED_ADDRESS, OLED_ROTATE_180) {
        Ok(display) => Some(display),
        Err(e) => {
            warn!("running without display: {}", e);
            None
        }
    };

    let mut keypad = KeypadMatrix::new(
        [
            keypad_row0!(pins).into_push_pull_output().into_dyn_pin(),
            keypad_row1!(pins).into_push_pull_output().into_dyn_pin(),
            keypad_row2!(pins).into_push_pull_output().into_dyn_pin(),
            keypad_row3!(pins).into_push_pull_output().into_dyn_pin(),
            keypad_row4!(pins).into_push_pull_output().into_dyn_pin(),
        ],
        [
            keypad_col0!(pins).into_pull_up_input().into_dyn_pin(),
            keypad_col1!(pins).into_pull_up_input().into_dyn_pin(),
            keypad_col2!(pins).into_pull_up_input().into_dyn_pin(),
            keypad_col3!(pins).into_pull_up_input().into_dyn_pin(),
        ],
        KEYPAD_LAYOUT,
    );
    let mut debouncer = KeyDebouncer::new(clock.now());

    let eeprom = At24Eeprom::new(SharedI2c::new(&I2C_BUS), timer, EEPROM_ADDRESS, EEPROM_CAPACITY);
    debug_assert!(STORAGE_SPAN as u32 <= EEPROM_CAPACITY);
    let layout = ChannelLayout::new(PUMP_BOARDS, MOTORS_PER_BOARD);
    let mut controller = PumpController::new(eeprom, layout, ChannelAddress::new(LOCAL_BOARD, LOCAL_MOTOR))
        .with_message_hold(MESSAGE_HOLD_MS);
    info!(
        "pumpino up: {} board(s) x {} motor(s), generation {}",
        layout.boards(),
        layout.motors_per_board(),
        controller.pump().store().generation()
    );

    let mut rx = [0u8; 64];
    loop {
        let count = usb_link::drain_inbox(&mut rx);
        if count > 0 {
            controller.receive(&rx[..count]);
        }

        let now = clock.now();
        let key = debouncer.update(keypad.scan(), now);
        if let Some(reply) = controller.poll(now, key, &mut shields) {
            if let Err(e) = usb_link::send_line(&reply) {
                warn!("reply not sent: {}", e);
            }
        }

        if let Some(screen) = controller.screen_update(now) {
            if let Some(display) = display.as_mut() {
                if display.show(&screen).is_err() {
                    controller.invalidate_screen();
                }
            }
        }

        let running = controller.pump().scheduler().bank().iter().any(|(_, channel)| channel.is_running());
        let _ = if running { led.set_high() } else { led.set_low() };
    }
}

#[interrupt]
unsafe fn USBCTRL_IRQ() {
    usb_link::on_interrupt();
}
