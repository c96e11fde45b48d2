//! Drives an NGX actuator over a real TCP socket against a fake controller.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use labbook_hardware::{Actuator, Communicator, NgxGpActuator, TcpCommunicator};

/// Answers each received line from `replies`, in order, then hangs up.
fn fake_controller(replies: &'static [&'static str]) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut received = Vec::new();
        for reply in replies {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 {
                break;
            }
            received.push(line.trim_end().to_string());
            writer.write_all(format!("{reply}\r\n").as_bytes()).unwrap();
        }
        received
    });
    (addr, handle)
}

#[test]
fn open_valve_over_tcp() {
    let (addr, controller) = fake_controller(&["E00", "OPEN"]);
    let comm = TcpCommunicator::connect(addr, Duration::from_secs(2)).unwrap();
    assert!(!comm.is_simulation());

    let mut valve = NgxGpActuator::new(comm);
    assert!(valve.open_channel("3"));
    drop(valve);

    let received = controller.join().unwrap();
    assert_eq!(received, vec!["OpenValve 3", "GetValveStatus 3"]);
}

#[test]
fn hang_up_reads_as_no_reply() {
    let (addr, controller) = fake_controller(&[]);
    let mut comm = TcpCommunicator::connect(addr, Duration::from_secs(2)).unwrap();
    controller.join().unwrap();
    assert_eq!(comm.ask("GetValveStatus 1"), None);
}

/// Serves every connection on its own thread. `OpenValve` is answered only
/// after `delay`; `GetValveStatus` is answered at once.
fn slow_controller(delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            thread::spawn(move || serve_slowly(stream, delay));
        }
    });
    addr
}

fn serve_slowly(stream: TcpStream, delay: Duration) {
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    while matches!(reader.read_line(&mut line), Ok(n) if n > 0) {
        let reply = if line.starts_with("OpenValve") {
            thread::sleep(delay);
            "E00"
        } else {
            "OPEN"
        };
        if writer.write_all(format!("{reply}\r\n").as_bytes()).is_err() {
            break;
        }
        line.clear();
    }
}

#[test]
fn late_reply_is_not_taken_for_the_next_answer() {
    let timeout = Duration::from_millis(200);
    let addr = slow_controller(timeout * 3);
    let mut comm = TcpCommunicator::connect(addr, timeout).unwrap();

    assert_eq!(comm.ask("OpenValve 5"), None);
    assert_eq!(comm.ask("GetValveStatus 5").as_deref(), Some("OPEN"));
    assert_eq!(comm.ask("GetValveStatus 5").as_deref(), Some("OPEN"));
}
