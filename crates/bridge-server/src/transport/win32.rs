//! Win32 bindings for the shared-memory and DDE transports.

use std::iter;
use std::path::PathBuf;
use std::ptr;
use std::time::Duration;

use bridge_core::TransportError;
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, FALSE, HANDLE, STILL_ACTIVE, WAIT_ABANDONED, WAIT_FAILED,
    WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::DataExchange::{
    DdeClientTransaction, DdeConnect, DdeCreateDataHandle, DdeCreateStringHandleA, DdeDisconnect,
    DdeFreeDataHandle, DdeFreeStringHandle, DdeGetData, DdeGetLastError, DdeInitializeA,
    DdeQueryConvInfo, DdeUninitialize, APPCMD_CLIENTONLY, CONVINFO, CP_WINANSI,
    DMLERR_NO_CONV_ESTABLISHED, DMLERR_NO_ERROR, HCONV, HDDEDATA, HSZ, XTYP_POKE, XTYP_REQUEST,
};
use windows_sys::Win32::System::Memory::{
    MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_ALL_ACCESS,
    MEMORY_MAPPED_VIEW_ADDRESS,
};
use windows_sys::Win32::System::ProcessStatus::GetModuleFileNameExW;
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, OpenEventW, OpenMutexW, OpenProcess, PulseEvent, ReleaseMutex,
    ResetEvent, WaitForMultipleObjects, WaitForSingleObject, EVENT_ALL_ACCESS, MUTEX_ALL_ACCESS,
    PROCESS_QUERY_INFORMATION, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SYNCHRONIZE,
    PROCESS_VM_READ,
};
use windows_sys::Win32::UI::WindowsAndMessaging::GetWindowThreadProcessId;

use super::dde::{DdeClient, BRAIN_ACTIVITY_ITEM, MACRO_ITEM, SERVICE, TOPIC};
use super::shared_memory::{ChannelOpener, SharedChannel, HEADER_LEN};

const CF_TEXT: u32 = 1;
const DDE_TIMEOUT_MS: u32 = 5_000;
const QID_SYNC: u32 = 0xFFFF_FFFF;

const PID_OFFSET: usize = 4;
const BYTE_LENGTH_OFFSET: usize = 12;
const BUFFER_SIZE_OFFSET: usize = 16;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(iter::once(0)).collect()
}

fn last_error() -> u32 {
    unsafe { GetLastError() }
}

struct OwnedHandle(HANDLE);

impl OwnedHandle {
    fn new(handle: HANDLE) -> Option<Self> {
        (handle != 0).then_some(OwnedHandle(handle))
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn exit_code_is_active(process: HANDLE) -> bool {
    let mut exit_code = 0u32;
    let ok = unsafe { GetExitCodeProcess(process, &mut exit_code) };
    ok != 0 && exit_code == STILL_ACTIVE as u32
}

/// Directory of the executable of `pid`.
fn module_directory(pid: u32) -> Option<PathBuf> {
    let process = OwnedHandle::new(unsafe {
        OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, FALSE, pid)
    })?;

    let mut buf = vec![0u16; 1024];
    let len = unsafe { GetModuleFileNameExW(process.0, 0, buf.as_mut_ptr(), buf.len() as u32) };
    if len == 0 {
        return None;
    }

    let path = PathBuf::from(String::from_utf16_lossy(&buf[..len as usize]));
    path.parent().map(PathBuf::from)
}

// Shared memory

pub struct Win32ChannelOpener {
    timeout_ms: u32,
}

impl Win32ChannelOpener {
    pub fn new(timeout: Duration) -> Self {
        Win32ChannelOpener {
            timeout_ms: u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX),
        }
    }
}

impl ChannelOpener for Win32ChannelOpener {
    type Channel = Win32Channel;

    fn open(&mut self, name: &str) -> Result<Option<Win32Channel>, TransportError> {
        let Some(mapping) = OwnedHandle::new(unsafe {
            OpenFileMappingW(FILE_MAP_ALL_ACCESS, FALSE, wide(&format!("{name}_mem")).as_ptr())
        }) else {
            return Ok(None);
        };

        let view = MappedView(unsafe { MapViewOfFile(mapping.0, FILE_MAP_ALL_ACCESS, 0, 0, 0) });
        if view.0.Value.is_null() {
            return Err(TransportError::Other(format!(
                "Unable to map {name} memory ({})",
                last_error()
            )));
        }

        let open_object = |suffix: &str| -> Result<OwnedHandle, TransportError> {
            let object = wide(&format!("{name}_{suffix}"));
            let handle = unsafe {
                if suffix == "mutex" {
                    OpenMutexW(MUTEX_ALL_ACCESS, FALSE, object.as_ptr())
                } else {
                    OpenEventW(EVENT_ALL_ACCESS, FALSE, object.as_ptr())
                }
            };
            OwnedHandle::new(handle)
                .ok_or_else(|| TransportError::Other(format!("Unable to open {name} {suffix}")))
        };

        let mutex = open_object("mutex")?;
        let result_event = open_object("result")?;
        let request_event = open_object("request")?;

        let mut channel = Win32Channel {
            view,
            _mapping: mapping,
            mutex,
            result_event,
            request_event,
            process: None,
            timeout_ms: self.timeout_ms,
        };

        let pid = channel.read_u32(PID_OFFSET);
        channel.process = OwnedHandle::new(unsafe {
            OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_SYNCHRONIZE, FALSE, pid)
        });

        Ok(Some(channel))
    }
}

struct MappedView(MEMORY_MAPPED_VIEW_ADDRESS);

impl Drop for MappedView {
    fn drop(&mut self) {
        unsafe {
            UnmapViewOfFile(self.0);
        }
    }
}

pub struct Win32Channel {
    view: MappedView,
    _mapping: OwnedHandle,
    mutex: OwnedHandle,
    result_event: OwnedHandle,
    request_event: OwnedHandle,
    process: Option<OwnedHandle>,
    timeout_ms: u32,
}

// SAFETY: the view is only touched by the thread that owns the channel, and
// every access happens while holding the engine mutex.
unsafe impl Send for Win32Channel {}

impl Win32Channel {
    fn base(&self) -> *mut u8 {
        self.view.0.Value.cast::<u8>()
    }

    fn read_u32(&self, offset: usize) -> u32 {
        unsafe { ptr::read_unaligned(self.base().add(offset).cast::<u32>()) }
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        unsafe { ptr::write_unaligned(self.base().add(offset).cast::<u32>(), value) }
    }

    fn wait_for_result(&self) -> Result<(), TransportError> {
        let Some(process) = &self.process else {
            return Err(TransportError::EngineExited);
        };
        let handles = [process.0, self.result_event.0];

        for _ in 0..2 {
            let r = unsafe { WaitForMultipleObjects(2, handles.as_ptr(), FALSE, self.timeout_ms) };
            match r {
                r if r == WAIT_OBJECT_0 + 1 => return Ok(()),
                r if r == WAIT_OBJECT_0 => return Err(TransportError::EngineExited),
                WAIT_TIMEOUT => continue,
                r => {
                    return Err(TransportError::Other(format!(
                        "wait for engine failed: r = {r} ({})",
                        last_error()
                    )))
                }
            }
        }

        Err(TransportError::Timeout)
    }
}

impl SharedChannel for Win32Channel {
    fn lock(&mut self) -> Result<(), TransportError> {
        match unsafe { WaitForSingleObject(self.mutex.0, self.timeout_ms) } {
            WAIT_OBJECT_0 => Ok(()),
            WAIT_ABANDONED => {
                unsafe {
                    ReleaseMutex(self.mutex.0);
                }
                Err(TransportError::Lock("restart engine".to_string()))
            }
            WAIT_FAILED => Err(TransportError::Lock(format!("error {}", last_error()))),
            _ if !self.creator_alive() => Err(TransportError::EngineExited),
            _ => Err(TransportError::Lock("unknown reason".to_string())),
        }
    }

    fn unlock(&mut self) {
        unsafe {
            ReleaseMutex(self.mutex.0);
        }
    }

    fn capacity(&self) -> usize {
        (self.read_u32(BUFFER_SIZE_OFFSET) as usize).saturating_sub(HEADER_LEN)
    }

    fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        let capacity = self.capacity();
        if request.len() >= capacity {
            return Err(TransportError::TooLong {
                len: request.len(),
                limit: capacity.saturating_sub(1),
            });
        }

        unsafe {
            let contents = self.base().add(HEADER_LEN);
            ptr::copy_nonoverlapping(request.as_ptr(), contents, request.len());
            *contents.add(request.len()) = 0;
        }
        self.write_u32(BYTE_LENGTH_OFFSET, request.len() as u32);

        unsafe {
            ResetEvent(self.result_event.0);
            PulseEvent(self.request_event.0);
        }

        self.wait_for_result()?;

        let len = (self.read_u32(BYTE_LENGTH_OFFSET) as usize).min(capacity);
        let mut reply = unsafe { std::slice::from_raw_parts(self.base().add(HEADER_LEN), len) }.to_vec();
        while reply.last() == Some(&0) {
            reply.pop();
        }
        Ok(reply)
    }

    fn creator_alive(&mut self) -> bool {
        self.process.as_ref().is_some_and(|process| exit_code_is_active(process.0))
    }

    fn working_directory(&self) -> Option<PathBuf> {
        module_directory(self.read_u32(PID_OFFSET))
    }
}

// DDE

unsafe extern "system" fn dde_callback(
    _wtype: u32,
    _wfmt: u32,
    _hconv: HCONV,
    _hsz1: HSZ,
    _hsz2: HSZ,
    _hdata: HDDEDATA,
    _dwdata1: usize,
    _dwdata2: usize,
) -> HDDEDATA {
    0
}

/// One DDEML instance. DDEML handles are bound to the initialising thread,
/// so every call builds and tears down its own instance.
struct DdeInstance {
    id: u32,
}

impl DdeInstance {
    fn new() -> Result<Self, TransportError> {
        let mut id = 0u32;
        let r = unsafe { DdeInitializeA(&mut id, Some(dde_callback), APPCMD_CLIENTONLY, 0) };
        if r != DMLERR_NO_ERROR {
            return Err(TransportError::Other(format!("DdeInitialize failed ({r})")));
        }
        Ok(DdeInstance { id })
    }

    fn string(&self, s: &str) -> Result<DdeString<'_>, TransportError> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        let hsz = unsafe { DdeCreateStringHandleA(self.id, bytes.as_ptr(), CP_WINANSI) };
        if hsz == 0 {
            return Err(self.error());
        }
        Ok(DdeString { dde: self, hsz })
    }

    fn error(&self) -> TransportError {
        let code = unsafe { DdeGetLastError(self.id) };
        TransportError::Other(format!("DDE error {code:#06x}"))
    }

    /// Run `f` inside a `Vivarium`/`NornSockets` conversation.
    fn with_conversation<T, F>(&self, f: F) -> Result<Option<T>, TransportError>
    where
        F: FnOnce(HCONV) -> Result<T, TransportError>,
    {
        let service = self.string(SERVICE)?;
        let topic = self.string(TOPIC)?;

        let conv = unsafe { DdeConnect(self.id, service.hsz, topic.hsz, ptr::null()) };
        if conv == 0 {
            return match unsafe { DdeGetLastError(self.id) } {
                DMLERR_NO_ERROR | DMLERR_NO_CONV_ESTABLISHED => Ok(None),
                code => Err(TransportError::Other(format!("DDE error {code:#06x}"))),
            };
        }

        let result = f(conv);
        unsafe {
            DdeDisconnect(conv);
        }
        result.map(Some)
    }

    fn request(&self, conv: HCONV, item: &str) -> Result<Vec<u8>, TransportError> {
        let item = self.string(item)?;
        let mut status = 0u32;
        let data = unsafe {
            DdeClientTransaction(ptr::null(), 0, conv, item.hsz, CF_TEXT, XTYP_REQUEST, DDE_TIMEOUT_MS, &mut status)
        };
        if data == 0 {
            return Err(self.error());
        }

        let size = unsafe { DdeGetData(data, ptr::null_mut(), 0, 0) };
        let mut bytes = vec![0u8; size as usize];
        unsafe {
            DdeGetData(data, bytes.as_mut_ptr(), size, 0);
            DdeFreeDataHandle(data);
        }
        Ok(bytes)
    }
}

impl Drop for DdeInstance {
    fn drop(&mut self) {
        unsafe {
            DdeUninitialize(self.id);
        }
    }
}

struct DdeString<'a> {
    dde: &'a DdeInstance,
    hsz: HSZ,
}

impl Drop for DdeString<'_> {
    fn drop(&mut self) {
        unsafe {
            DdeFreeStringHandle(self.dde.id, self.hsz);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Win32DdeClient;

impl DdeClient for Win32DdeClient {
    fn execute_macro(&mut self, script: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        let dde = DdeInstance::new()?;
        dde.with_conversation(|conv| {
            let blank = dde.string(" ")?;
            let mut script = script.to_vec();
            script.push(0);

            let handle = unsafe {
                DdeCreateDataHandle(dde.id, script.as_ptr(), script.len() as u32, 0, blank.hsz, CF_TEXT, 0)
            };
            if handle == 0 {
                return Err(dde.error());
            }

            let mut status = 0u32;
            let poked = unsafe {
                DdeClientTransaction(
                    handle as *const u8,
                    u32::MAX,
                    conv,
                    blank.hsz,
                    CF_TEXT,
                    XTYP_POKE,
                    DDE_TIMEOUT_MS,
                    &mut status,
                )
            };
            if poked == 0 {
                return Err(dde.error());
            }

            dde.request(conv, MACRO_ITEM)
        })
    }

    fn brain_activity(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let dde = DdeInstance::new()?;
        dde.with_conversation(|conv| dde.request(conv, BRAIN_ACTIVITY_ITEM))
    }

    fn partner_pid(&mut self) -> Option<u32> {
        let dde = DdeInstance::new().ok()?;
        let hwnd = dde
            .with_conversation(|conv| {
                let mut info: CONVINFO = unsafe { std::mem::zeroed() };
                info.cb = std::mem::size_of::<CONVINFO>() as u32;
                if unsafe { DdeQueryConvInfo(conv, QID_SYNC, &mut info) } == 0 {
                    return Err(dde.error());
                }
                Ok(info.hwndPartner)
            })
            .ok()
            .flatten()?;

        let mut pid = 0u32;
        unsafe {
            GetWindowThreadProcessId(hwnd, &mut pid);
        }
        (pid != 0).then_some(pid)
    }

    fn process_running(&mut self, pid: u32) -> bool {
        OwnedHandle::new(unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid) })
            .is_some_and(|process| exit_code_is_active(process.0))
    }

    fn conversation_available(&mut self) -> bool {
        DdeInstance::new()
            .and_then(|dde| dde.with_conversation(|_| Ok(())))
            .is_ok_and(|found| found.is_some())
    }

    fn working_directory(&mut self, pid: u32) -> Option<PathBuf> {
        module_directory(pid)
    }
}
