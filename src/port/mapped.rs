use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::FromRawFd;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use libc::{
	MAP_SHARED,
	O_CLOEXEC,
	O_RDWR,
	O_SYNC,
	PROT_READ,
	PROT_WRITE,
	c_void,
	mmap,
	munmap,
	open,
};

use super::Port;

/// A memory-mapped register window (e.g. a PCI resource file or a GPIO
/// character device that supports mmap).
#[derive(Debug)]
pub struct Mapped {
	ptr: ptr::NonNull<u8>, // u8 instead of void for easier offset operations
	len: usize,
}

// register accesses are volatile single-word operations
unsafe impl Send for Mapped {}
unsafe impl Sync for Mapped {}

impl Drop for Mapped {
	fn drop(&mut self) {
		let res = unsafe { munmap(self.ptr.as_ptr() as *mut c_void, self.len) };
		if 0 != res {
			error!("munmap failed: {}", io::Error::last_os_error());
		}
	}
}

impl Mapped {
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		0 == self.len
	}

	pub fn read_dword(&self, offset: usize) -> u32 {
		assert!(offset & 3 == 0);
		assert!(offset + 3 < self.len);
		u32::from_le(unsafe { ptr::read_volatile(self.ptr.as_ptr().add(offset) as *const u32) })
	}

	pub fn write_dword(&self, offset: usize, data: u32) {
		assert!(offset & 3 == 0);
		assert!(offset + 3 < self.len);
		unsafe { ptr::write_volatile(self.ptr.as_ptr().add(offset) as *mut u32, data.to_le()) }
	}
}

// TODO: exclusive open / file locking?
pub fn open_mapped(path: &Path) -> io::Result<Arc<Mapped>> {
	let c_path = CString::new(path.as_os_str().as_bytes())?;

	let fd = unsafe { open(c_path.as_ptr(), O_RDWR | O_CLOEXEC | O_SYNC) };
	if -1 == fd {
		return Err(io::Error::last_os_error());
	}
	// now get fd managed to prevent resource leak
	let f = unsafe { fs::File::from_raw_fd(fd) };

	let size = f.metadata()?.len();
	if size == 0 || size >= !0usize as u64 {
		return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("can't map {} bytes", size)));
	}
	let size = size as usize;
	let area = unsafe {
		mmap(
			ptr::null_mut(),
			size,
			PROT_READ | PROT_WRITE,
			MAP_SHARED,
			fd,
			0,
		)
	};

	if area as usize == !0usize {
		return Err(io::Error::last_os_error());
	}
	match ptr::NonNull::new(area as *mut u8) {
		None => Err(io::Error::new(io::ErrorKind::Other, "mmap returned NULL")),
		Some(area) => {
			debug!("mapped {} bytes of {}", size, path.display());
			Ok(Arc::new(Mapped {
				ptr: area,
				len: size,
			}))
		},
	}
}

/// GPIO port made of an output register and an input register inside a
/// mapped window; the pins must be configured open-drain by the platform.
pub struct MappedPort {
	map: Arc<Mapped>,
	output_offset: usize,
	input_offset: usize,
}

impl MappedPort {
	pub fn new(map: Arc<Mapped>, output_offset: usize, input_offset: usize) -> crate::AResult<Self> {
		ensure!(output_offset & 3 == 0 && input_offset & 3 == 0, "register offsets must be 32-bit aligned");
		ensure!(
			output_offset + 3 < map.len() && input_offset + 3 < map.len(),
			"register offsets 0x{:x}/0x{:x} outside of mapped window ({} bytes)", output_offset, input_offset, map.len()
		);
		Ok(MappedPort {
			map,
			output_offset,
			input_offset,
		})
	}
}

/// Map `path` and build a port on it.
pub fn open_mapped_port(path: &Path, output_offset: usize, input_offset: usize) -> crate::AResult<MappedPort> {
	let map = with_context!(("failed to map {}", path.display()), Ok(open_mapped(path)?))?;
	MappedPort::new(map, output_offset, input_offset)
}

impl Port for MappedPort {
	fn write(&mut self, value: u32) {
		self.map.write_dword(self.output_offset, value);
	}

	fn read(&mut self) -> u32 {
		self.map.read_dword(self.input_offset)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn port_on_mapped_file() {
		let path = std::env::temp_dir().join(format!("i2c-bitbang-mapped-{}", std::process::id()));
		fs::File::create(&path).unwrap().write_all(&[0u8; 16]).unwrap();

		let map = open_mapped(&path).unwrap();
		assert_eq!(map.len(), 16);
		let mut port = MappedPort::new(map.clone(), 4, 4).unwrap();
		port.write(0xa5);
		assert_eq!(port.read(), 0xa5);
		assert_eq!(map.read_dword(0), 0);

		assert!(MappedPort::new(map.clone(), 16, 0).is_err());
		assert!(MappedPort::new(map, 2, 0).is_err());

		fs::remove_file(&path).unwrap();
	}
}
